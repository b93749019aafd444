//! Baton HTTP Client
//!
//! A small, type-safe HTTP client for the task endpoints of the workflow
//! orchestration server. Workers use it to lease tasks and to report their
//! outcome; nothing here knows about handlers or polling schedules.
//!
//! # Example
//!
//! ```no_run
//! use baton_client::ServerClient;
//! use baton_core::dto::task::PollQuery;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), baton_client::ClientError> {
//!     let client = ServerClient::new("http://localhost:8080/api");
//!
//!     let tasks = client.poll_tasks(&PollQuery::new("greet", "worker-1", 5)).await?;
//!     println!("Leased {} task(s)", tasks.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod tasks;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

/// HTTP client for the orchestration server's task API
#[derive(Debug, Clone)]
pub struct ServerClient {
    /// Base URL of the server API (e.g., "http://localhost:8080/api")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ServerClient {
    /// Create a new server client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the server API (e.g., "http://localhost:8080/api")
    ///
    /// # Example
    /// ```
    /// use baton_client::ServerClient;
    ///
    /// let client = ServerClient::new("http://localhost:8080/api");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new server client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use baton_client::ServerClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = ServerClient::with_client("http://localhost:8080/api", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and turn failures into [`ClientError::ApiError`]
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle a response whose body may legitimately be empty
    ///
    /// Long-poll endpoints answer 204 (or 200 with no body) when nothing is
    /// available; both decode to `T::default()`.
    async fn handle_optional_response<T: DeserializeOwned + Default>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let response = self.check_status(response).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(T::default());
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&body)
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle a response whose body is irrelevant
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        self.check_status(response).await.map(|_| ())
    }
}
