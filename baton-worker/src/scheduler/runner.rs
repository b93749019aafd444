//! Task runner
//!
//! Owns the poll loops of every registered worker. There is exactly one
//! loop per task name: registering a worker whose name is already running
//! hands the new descriptor to the live loop instead of starting another.

use anyhow::Context as AnyhowContext;
use baton_client::ServerClient;
use baton_core::domain::task::Task;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use super::poller::{Shared, WorkerPoller, WorkerState, WorkerStatus};
use crate::config::RunnerConfig;
use crate::error::{BoxError, WorkerError};
use crate::options::WorkerOption;
use crate::repository::TaskRepository;
use crate::service::ResultReporter;
use crate::worker::{Worker, WorkerProvider};

/// Runs registered workers against the server
///
/// Cloning is cheap; clones drive the same set of workers.
///
/// All methods that start poll loops must be called from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    shared: Arc<Shared>,
    workers: Mutex<HashMap<String, WorkerSlot>>,
}

struct WorkerSlot {
    sender: watch::Sender<Worker>,
    status: Arc<WorkerStatus>,
}

impl TaskRunner {
    /// Creates a runner that talks to the server at `config.server_url`
    pub fn new(config: RunnerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let client = ServerClient::with_client(&config.server_url, http);

        Ok(Self::with_repository(config, Arc::new(client)))
    }

    /// Creates a runner on top of any task repository
    pub fn with_repository(config: RunnerConfig, repository: Arc<dyn TaskRepository>) -> Self {
        let reporter = ResultReporter::new(Arc::clone(&repository), &config);
        let budget = config
            .max_concurrent_tasks
            .map(|max| Arc::new(Semaphore::new(max)));

        let shared = Shared {
            repository,
            reporter,
            worker_id: config.worker_id,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            budget,
        };

        Self {
            inner: Arc::new(RunnerInner {
                shared: Arc::new(shared),
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.shared.worker_id
    }

    /// Starts polling for the worker's task type
    ///
    /// When a loop for the same task name is already running, the new
    /// descriptor replaces the old one in that loop (last registration
    /// wins). A loop that stopped because its base context was cancelled is
    /// started again.
    pub fn register_worker(&self, provider: impl WorkerProvider) -> Result<(), WorkerError> {
        let worker = provider.worker();
        let task_name = worker.task_name().to_string();

        if task_name.trim().is_empty() {
            return Err(WorkerError::Configuration(
                "task name must not be empty".to_string(),
            ));
        }

        if self.inner.shared.shutdown.is_cancelled() {
            return Err(WorkerError::Configuration(format!(
                "cannot register worker for task {}: runner is shut down",
                task_name
            )));
        }

        let mut workers = self.lock_workers();

        let status = match workers.get(&task_name) {
            Some(slot) => {
                let _lifecycle = slot.status.lock_lifecycle();
                if slot.status.state() != WorkerState::Stopped {
                    info!("Replacing worker for task {}", task_name);
                    slot.sender.send_replace(worker);
                    return Ok(());
                }
                // Tasks of the stopped loop may still be running
                slot.status.restart();
                Arc::clone(&slot.status)
            }
            None => Arc::new(WorkerStatus::new()),
        };

        info!(
            "Registering worker for task {} (batch size: {}, poll interval: {:?})",
            task_name,
            worker.options().batch_size,
            worker.options().poll_interval
        );

        let slot = self.spawn_poller(worker, status);
        workers.insert(task_name, slot);
        Ok(())
    }

    /// Starts a worker around a handler that only needs the task record
    pub fn start_worker<F, Fut, O, E>(
        &self,
        task_name: &str,
        handler: F,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Result<(), WorkerError>
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        self.start_worker_with_domain(task_name, handler, batch_size, poll_interval, "")
    }

    /// Like [`TaskRunner::start_worker`], polling the given domain
    pub fn start_worker_with_domain<F, Fut, O, E>(
        &self,
        task_name: &str,
        handler: F,
        batch_size: usize,
        poll_interval: Duration,
        domain: &str,
    ) -> Result<(), WorkerError>
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
        O: Serialize + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let worker = Worker::new(task_name, handler).with([
            WorkerOption::batch_size(batch_size),
            WorkerOption::poll_interval(poll_interval),
            WorkerOption::domain(domain),
        ]);
        self.register_worker(worker)
    }

    /// Changes how many tasks of `task_name` may run at once
    pub fn set_batch_size(&self, task_name: &str, batch_size: usize) -> Result<(), WorkerError> {
        if batch_size == 0 {
            return Err(WorkerError::Configuration(
                "batch size must be greater than 0".to_string(),
            ));
        }
        self.update_worker(task_name, WorkerOption::batch_size(batch_size))
    }

    /// Changes how long the loop of `task_name` waits after an empty poll
    pub fn set_poll_interval(&self, task_name: &str, interval: Duration) -> Result<(), WorkerError> {
        if interval.is_zero() {
            return Err(WorkerError::Configuration(
                "poll interval must be greater than 0".to_string(),
            ));
        }
        self.update_worker(task_name, WorkerOption::poll_interval(interval))
    }

    pub fn batch_size(&self, task_name: &str) -> Option<usize> {
        self.with_slot(task_name, |slot| slot.sender.borrow().options().batch_size)
    }

    pub fn poll_interval(&self, task_name: &str) -> Option<Duration> {
        self.with_slot(task_name, |slot| slot.sender.borrow().options().poll_interval)
    }

    /// Stops polling for `task_name`; tasks already running are unaffected
    pub fn pause(&self, task_name: &str) -> Result<(), WorkerError> {
        self.set_paused(task_name, true)
    }

    pub fn resume(&self, task_name: &str) -> Result<(), WorkerError> {
        self.set_paused(task_name, false)
    }

    /// Number of tasks of `task_name` currently executing
    pub fn running_tasks(&self, task_name: &str) -> usize {
        self.with_slot(task_name, |slot| slot.status.in_flight())
            .unwrap_or(0)
    }

    pub fn worker_state(&self, task_name: &str) -> Option<WorkerState> {
        self.with_slot(task_name, |slot| slot.status.state())
    }

    /// Names of all registered task types, sorted
    pub fn worker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_workers().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stops every poll loop and waits for in-flight tasks to be reported
    ///
    /// Handler contexts derived from the runner are cancelled. A poll that
    /// is already outstanding completes and its tasks are still executed.
    pub async fn shutdown(&self) {
        info!("Shutting down task runner");
        self.inner.shared.shutdown.cancel();
        self.inner.shared.tracker.close();
        self.inner.shared.tracker.wait().await;
        info!("Task runner stopped");
    }

    /// Waits until the runner has been shut down and drained
    pub async fn wait(&self) {
        self.inner.shared.shutdown.cancelled().await;
        self.inner.shared.tracker.wait().await;
    }

    fn spawn_poller(&self, worker: Worker, status: Arc<WorkerStatus>) -> WorkerSlot {
        let (sender, receiver) = watch::channel(worker);

        let poller = WorkerPoller::new(
            Arc::clone(&self.inner.shared),
            receiver,
            Arc::clone(&status),
        );
        self.inner.shared.tracker.spawn(poller.run());

        WorkerSlot { sender, status }
    }

    fn update_worker(&self, task_name: &str, option: WorkerOption) -> Result<(), WorkerError> {
        self.with_slot(task_name, |slot| {
            slot.sender
                .send_modify(|worker| *worker = worker.with([option]));
        })
        .ok_or_else(|| unknown_worker(task_name))
    }

    fn set_paused(&self, task_name: &str, paused: bool) -> Result<(), WorkerError> {
        self.with_slot(task_name, |slot| {
            slot.status.set_paused(paused);
            // Wake the loop so the change applies immediately
            slot.sender.send_modify(|_| {});
        })
        .ok_or_else(|| unknown_worker(task_name))?;

        info!(
            "{} worker for task {}",
            if paused { "Paused" } else { "Resumed" },
            task_name
        );
        Ok(())
    }

    fn with_slot<R>(&self, task_name: &str, f: impl FnOnce(&WorkerSlot) -> R) -> Option<R> {
        self.lock_workers().get(task_name).map(f)
    }

    fn lock_workers(&self) -> MutexGuard<'_, HashMap<String, WorkerSlot>> {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn unknown_worker(task_name: &str) -> WorkerError {
    WorkerError::Configuration(format!("no worker registered for task {}", task_name))
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("worker_id", &self.inner.shared.worker_id)
            .field("workers", &self.worker_names())
            .finish_non_exhaustive()
    }
}
