//! Typed workers
//!
//! A [`TypedWorker`] wraps a handler that takes a strongly-typed input and
//! returns a serializable output. Its adapter binds the task payload into
//! the input type before calling the handler; a binding failure is
//! reported as a task failure and the handler is never invoked.

use baton_core::domain::task::Task;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::binder::{InputBinder, JsonBinder, bind_task_input};
use crate::context::TaskContext;
use crate::error::{BoxError, WorkerError};
use crate::options::{WorkerOption, WorkerOptions};
use crate::worker::{HandlerFuture, TaskHandler, Worker, WorkerProvider};

type TypedFuture<TOut> = Pin<Box<dyn Future<Output = Result<TOut, BoxError>> + Send>>;
type TypedHandler<TIn, TOut> = Arc<dyn Fn(TaskContext, TIn) -> TypedFuture<TOut> + Send + Sync>;

/// Worker whose handler works on typed input and output
///
/// # Example
/// ```
/// use baton_worker::context::TaskContext;
/// use baton_worker::options::WorkerOption;
/// use baton_worker::typed::TypedWorker;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Default, Deserialize)]
/// struct Greet {
///     name: String,
/// }
///
/// #[derive(Serialize)]
/// struct Greeting {
///     greetings: String,
/// }
///
/// let worker = TypedWorker::new("greet", |_ctx: TaskContext, input: Greet| async move {
///     Ok::<_, std::io::Error>(Greeting {
///         greetings: format!("Hello, {}", input.name),
///     })
/// })
/// .with([WorkerOption::batch_size(2)]);
/// ```
pub struct TypedWorker<TIn, TOut, B = JsonBinder> {
    task_name: String,
    options: WorkerOptions,
    handler: TypedHandler<TIn, TOut>,
    binder: Arc<B>,
    _marker: PhantomData<fn(TIn) -> TOut>,
}

impl<TIn, TOut> TypedWorker<TIn, TOut, JsonBinder>
where
    TIn: DeserializeOwned + Default + Send + 'static,
    TOut: Serialize + Send + 'static,
{
    /// Creates a typed worker whose handler receives the task context
    ///
    /// Chain [`TypedWorker::with`] to supply options; they are applied in
    /// order on top of the defaults.
    pub fn new<F, Fut, E>(task_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(TaskContext, TIn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TOut, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let handler: TypedHandler<TIn, TOut> =
            Arc::new(move |ctx: TaskContext, input: TIn| -> TypedFuture<TOut> {
                let invocation = handler(ctx, input);
                Box::pin(async move { invocation.await.map_err(Into::into) })
            });

        Self {
            task_name: task_name.into(),
            options: WorkerOptions::default(),
            handler,
            binder: Arc::new(JsonBinder),
            _marker: PhantomData,
        }
    }

    /// Creates a typed worker whose handler only needs a cancellation token
    ///
    /// Options are supplied the same way as for [`TypedWorker::new`].
    pub fn simple<F, Fut, E>(task_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CancellationToken, TIn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TOut, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(task_name, move |ctx: TaskContext, input: TIn| {
            handler(ctx.cancellation_token().clone(), input)
        })
    }
}

impl<TIn, TOut, B> TypedWorker<TIn, TOut, B>
where
    TIn: DeserializeOwned + Default + Send + 'static,
    TOut: Serialize + Send + 'static,
    B: InputBinder,
{
    /// Replaces the input binder
    pub fn with_binder<B2: InputBinder>(self, binder: B2) -> TypedWorker<TIn, TOut, B2> {
        TypedWorker {
            task_name: self.task_name,
            options: self.options,
            handler: self.handler,
            binder: Arc::new(binder),
            _marker: PhantomData,
        }
    }

    /// Returns a copy with `options` applied; `self` is left untouched
    pub fn with(&self, options: impl IntoIterator<Item = WorkerOption>) -> Self {
        Self {
            options: self.options.clone().apply(options),
            ..self.clone()
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Snapshot of the current configuration
    pub fn options(&self) -> WorkerOptions {
        self.options.clone()
    }

    /// Untyped handler that binds the payload, invokes the typed handler and
    /// serializes its output
    pub fn adapter(&self) -> TaskHandler {
        let handler = Arc::clone(&self.handler);
        let binder = Arc::clone(&self.binder);

        Arc::new(move |task: Task, ctx: TaskContext| -> HandlerFuture {
            let invocation =
                bind_task_input::<TIn, B>(&binder, &task).map(|input| handler(ctx, input));

            Box::pin(async move {
                let output = invocation?.await.map_err(WorkerError::Handler)?;
                serde_json::to_value(output).map_err(WorkerError::Output)
            })
        })
    }
}

impl<TIn, TOut, B> WorkerProvider for TypedWorker<TIn, TOut, B>
where
    TIn: DeserializeOwned + Default + Send + 'static,
    TOut: Serialize + Send + 'static,
    B: InputBinder,
{
    fn worker(&self) -> Worker {
        Worker::from_parts(self.task_name.clone(), self.adapter(), self.options.clone())
    }

    fn task_name(&self) -> &str {
        &self.task_name
    }
}

impl<TIn, TOut, B> Clone for TypedWorker<TIn, TOut, B> {
    fn clone(&self) -> Self {
        Self {
            task_name: self.task_name.clone(),
            options: self.options.clone(),
            handler: Arc::clone(&self.handler),
            binder: Arc::clone(&self.binder),
            _marker: PhantomData,
        }
    }
}

impl<TIn, TOut, B> fmt::Debug for TypedWorker<TIn, TOut, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedWorker")
            .field("task_name", &self.task_name)
            .field("options", &self.options)
            .field("input", &std::any::type_name::<TIn>())
            .field("output", &std::any::type_name::<TOut>())
            .finish_non_exhaustive()
    }
}
