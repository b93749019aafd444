//! Error types for the worker runtime

use baton_client::ClientError;
use std::any::Any;
use thiserror::Error;

use crate::binder::BindingError;

/// A boxed error that can be sent across threads.
///
/// Handlers may fail with any error type; it is boxed into this before it
/// reaches the runner.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while registering workers or executing tasks
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Invalid worker registration, surfaced to the caller of registration
    #[error("Invalid worker configuration: {0}")]
    Configuration(String),

    /// Task input could not be decoded into the handler's input type
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// The handler returned an error; its message is reported verbatim
    #[error("{0}")]
    Handler(BoxError),

    /// The handler's return value could not be serialized as task output
    #[error("Failed to serialize task output: {0}")]
    Output(#[source] serde_json::Error),

    /// The handler panicked
    #[error("Handler panicked: {0}")]
    Panic(String),

    /// Talking to the server failed
    #[error(transparent)]
    Transport(#[from] ClientError),
}

impl WorkerError {
    /// Whether the server should give up on the task instead of retrying it
    ///
    /// True when the handler error is a [`TerminalError`] or has one
    /// anywhere in its source chain.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Handler(e) => {
                let root: &(dyn std::error::Error + 'static) = &**e;
                std::iter::successors(Some(root), |err| err.source())
                    .any(|err| err.is::<TerminalError>())
            }
            _ => false,
        }
    }

    /// Converts a failed handler invocation into an error
    pub(crate) fn from_join_error(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::Panic(panic_message(err.into_panic()))
        } else {
            Self::Handler("handler invocation was cancelled".into())
        }
    }
}

/// Handler error that marks a task as failed without retries.
///
/// ```
/// use baton_worker::error::TerminalError;
///
/// async fn charge(amount: i64) -> Result<(), TerminalError> {
///     if amount < 0 {
///         return Err(TerminalError::new("negative amount"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TerminalError(String);

impl TerminalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
