//! Baton Worker
//!
//! Runtime for task workers of a workflow orchestration server.
//!
//! Architecture:
//! - Workers: a task name, a handler and polling options ([`Worker`],
//!   [`TypedWorker`] for handlers with typed input and output)
//! - Binder: turns a task's input payload into the handler's input type
//! - Context: per-invocation identity, logs and cancellation
//! - Repositories: communication with the server ([`TaskRepository`])
//! - Services: reporting outcomes back to the server
//! - Scheduler: one poll loop per task name, bounded by batch size
//!
//! # Example
//!
//! ```no_run
//! use baton_worker::{RunnerConfig, TaskContext, TaskRunner, TypedWorker, WorkerOption};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Default, Deserialize)]
//! struct Greet {
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Greeting {
//!     greetings: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = TaskRunner::new(RunnerConfig::new("http://localhost:8080/api", "worker-1"))?;
//!
//!     let greet = TypedWorker::new("greet", |_ctx: TaskContext, input: Greet| async move {
//!         Ok::<_, std::io::Error>(Greeting {
//!             greetings: format!("Hello, {}", input.name),
//!         })
//!     })
//!     .with([WorkerOption::poll_interval(Duration::from_millis(200))]);
//!
//!     runner.register_worker(greet)?;
//!     tokio::signal::ctrl_c().await?;
//!     runner.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod options;
pub mod repository;
pub mod scheduler;
mod service;
pub mod typed;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use binder::{BindingError, InputBinder, JsonBinder};
pub use config::RunnerConfig;
pub use context::TaskContext;
pub use error::{BoxError, TerminalError, WorkerError};
pub use options::{PollTimeout, WorkerOption, WorkerOptions};
pub use repository::TaskRepository;
pub use scheduler::{TaskRunner, WorkerState};
pub use typed::TypedWorker;
pub use worker::{TaskHandler, Worker, WorkerProvider};
