//! Worker descriptor
//!
//! A [`Worker`] binds a task definition name to a handler and the options
//! that control how that task type is polled. Descriptors are immutable:
//! [`Worker::with`] returns an independent copy.

use baton_core::domain::task::Task;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::TaskContext;
use crate::error::{BoxError, WorkerError};
use crate::options::{WorkerOption, WorkerOptions};

/// Future returned by a [`TaskHandler`]
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, WorkerError>> + Send>>;

/// Untyped handler the runner invokes for every leased task
///
/// A successful `Value::Null` is a valid, empty result.
pub type TaskHandler = Arc<dyn Fn(Task, TaskContext) -> HandlerFuture + Send + Sync>;

/// Anything that can hand a [`Worker`] to the runner for registration
pub trait WorkerProvider {
    fn worker(&self) -> Worker;

    fn task_name(&self) -> &str;
}

/// Configuration of one task type: name, handler and polling options
#[derive(Clone)]
pub struct Worker {
    task_name: String,
    handler: TaskHandler,
    options: WorkerOptions,
}

impl Worker {
    /// Creates a worker with default options around a handler that only
    /// needs the task record
    ///
    /// Options are supplied by chaining [`Worker::with`] onto the
    /// constructor; they are applied in order, so a later option overrides
    /// an earlier one and invalid values leave the default in place.
    ///
    /// # Example
    /// ```
    /// use baton_worker::worker::Worker;
    /// use baton_worker::options::WorkerOption;
    /// use serde_json::json;
    ///
    /// let worker = Worker::new("greet", |task| async move {
    ///     let name = task
    ///         .input_data
    ///         .as_ref()
    ///         .and_then(|input| input.get("name"))
    ///         .and_then(|name| name.as_str())
    ///         .unwrap_or("stranger")
    ///         .to_string();
    ///     Ok::<_, std::io::Error>(json!({ "greetings": format!("Hello, {}", name) }))
    /// })
    /// .with([WorkerOption::batch_size(4)]);
    ///
    /// assert_eq!(worker.options().batch_size, 4);
    /// ```
    pub fn new<F, Fut, O, E>(task_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let handler: TaskHandler =
            Arc::new(move |task: Task, _ctx: TaskContext| -> HandlerFuture {
                let invocation = handler(task);
                Box::pin(async move {
                    let output = invocation
                        .await
                        .map_err(|e| WorkerError::Handler(e.into()))?;
                    serde_json::to_value(output).map_err(WorkerError::Output)
                })
            });

        Self::from_handler(task_name, handler)
    }

    /// Creates a worker with default options around an untyped handler
    pub fn from_handler(task_name: impl Into<String>, handler: TaskHandler) -> Self {
        Self {
            task_name: task_name.into(),
            handler,
            options: WorkerOptions::default(),
        }
    }

    pub(crate) fn from_parts(task_name: String, handler: TaskHandler, options: WorkerOptions) -> Self {
        Self {
            task_name,
            handler,
            options,
        }
    }

    /// Returns a copy with `options` applied on top of the current
    /// configuration; `self` is left untouched
    pub fn with(&self, options: impl IntoIterator<Item = WorkerOption>) -> Self {
        Self {
            task_name: self.task_name.clone(),
            handler: Arc::clone(&self.handler),
            options: self.options.clone().apply(options),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Snapshot of the current configuration
    pub fn options(&self) -> WorkerOptions {
        self.options.clone()
    }

    pub fn handler(&self) -> TaskHandler {
        Arc::clone(&self.handler)
    }

    /// Invokes the handler for `task`
    pub fn execute(&self, task: Task, context: TaskContext) -> HandlerFuture {
        (self.handler)(task, context)
    }
}

impl WorkerProvider for Worker {
    fn worker(&self) -> Worker {
        self.clone()
    }

    fn task_name(&self) -> &str {
        &self.task_name
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("task_name", &self.task_name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
