//! Runner configuration
//!
//! Defines the process-wide settings of a task runner: where the server
//! lives, how this process identifies itself, the overall concurrency budget,
//! and how hard to try when reporting results.
//!
//! Per-worker settings (batch size, poll interval, ...) live on the worker
//! descriptor instead, see [`crate::options`].

use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL of the server API (e.g., "http://localhost:8080/api")
    pub server_url: String,

    /// Identifier reported to the server with every poll and result
    pub worker_id: String,

    /// Upper bound on handler invocations in flight across all workers.
    /// `None` leaves each worker bounded only by its batch size.
    pub max_concurrent_tasks: Option<usize>,

    /// How many times a failed result report is retried
    pub update_retry_count: u32,

    /// Delay before the first report retry; doubles on every attempt
    pub update_retry_delay: Duration,

    /// Timeout for HTTP requests that are not long-polls
    pub http_timeout: Duration,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(server_url: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            worker_id: worker_id.into(),
            max_concurrent_tasks: None,
            update_retry_count: 3,
            update_retry_delay: Duration::from_millis(500),
            http_timeout: Duration::from_secs(30),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - BATON_SERVER_URL (required)
    /// - BATON_WORKER_ID (optional, default: random UUID)
    /// - BATON_MAX_CONCURRENT_TASKS (optional, default: unbounded)
    /// - BATON_UPDATE_RETRY_COUNT (optional, default: 3)
    /// - BATON_UPDATE_RETRY_DELAY_MS (optional, default: 500)
    /// - BATON_HTTP_TIMEOUT (optional, seconds, default: 30)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let server_url = lookup("BATON_SERVER_URL")
            .ok_or_else(|| anyhow::anyhow!("BATON_SERVER_URL environment variable not set"))?;

        let worker_id = lookup("BATON_WORKER_ID")
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut config = Self::new(server_url, worker_id);

        config.max_concurrent_tasks = lookup("BATON_MAX_CONCURRENT_TASKS")
            .and_then(|s| s.parse::<usize>().ok());

        if let Some(count) = lookup("BATON_UPDATE_RETRY_COUNT").and_then(|s| s.parse::<u32>().ok())
        {
            config.update_retry_count = count;
        }

        if let Some(delay) = lookup("BATON_UPDATE_RETRY_DELAY_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
        {
            config.update_retry_delay = delay;
        }

        if let Some(timeout) = lookup("BATON_HTTP_TIMEOUT")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
        {
            config.http_timeout = timeout;
        }

        Ok(config)
    }

    /// Caps the number of handler invocations in flight across all workers
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = Some(max);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.server_url.is_empty() {
            anyhow::bail!("server_url cannot be empty");
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            anyhow::bail!("server_url must start with http:// or https://");
        }

        if self.max_concurrent_tasks == Some(0) {
            anyhow::bail!("max_concurrent_tasks must be greater than 0");
        }

        if self.http_timeout.is_zero() {
            anyhow::bail!("http_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(
            "http://localhost:8080/api",
            uuid::Uuid::new_v4().to_string(),
        )
    }
}
