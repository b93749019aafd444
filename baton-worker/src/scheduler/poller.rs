//! Worker poller
//!
//! Polls the server for one task type and executes the leased tasks. Each
//! task runs in its own tokio task; the number of tasks in flight never
//! exceeds the worker's batch size.

use baton_core::domain::task::Task;
use baton_core::dto::task::PollQuery;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::context::TaskContext;
use crate::error::WorkerError;
use crate::execution::ExecutionOutcome;
use crate::repository::TaskRepository;
use crate::service::ResultReporter;
use crate::worker::Worker;

/// What a worker's poll loop is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Sleeping between polls, or paused
    Idle = 0,
    /// A poll request is outstanding
    Polling = 1,
    /// Handing leased tasks to their handlers
    Dispatching = 2,
    /// Every slot is taken; waiting for a task to finish
    AwaitingCompletion = 3,
    /// The loop exited and will not poll again
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Polling,
            2 => Self::Dispatching,
            3 => Self::AwaitingCompletion,
            _ => Self::Stopped,
        }
    }
}

/// Runtime state of one worker, shared between its loop and the runner
#[derive(Debug)]
pub(crate) struct WorkerStatus {
    state: AtomicU8,
    in_flight: AtomicUsize,
    paused: AtomicBool,
    slot_freed: Notify,
    /// Serializes the loop's decision to stop with re-registration
    lifecycle: Mutex<()>,
}

impl WorkerStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Idle as u8),
            in_flight: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            slot_freed: Notify::new(),
            lifecycle: Mutex::new(()),
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Prepares a stopped worker for a new loop; tasks still in flight
    /// keep counting against the batch
    pub(crate) fn restart(&self) {
        self.set_paused(false);
        self.set_state(WorkerState::Idle);
    }

    pub(crate) fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds one batch slot for the lifetime of a dispatched task
struct InFlightGuard(Arc<WorkerStatus>);

impl InFlightGuard {
    fn acquire(status: &Arc<WorkerStatus>) -> Self {
        status.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(status))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.0.slot_freed.notify_one();
    }
}

/// State shared by every poll loop of a runner
pub(crate) struct Shared {
    pub(crate) repository: Arc<dyn TaskRepository>,
    pub(crate) reporter: ResultReporter,
    pub(crate) worker_id: String,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tracker: TaskTracker,
    /// Runner-wide cap on tasks in flight across all workers
    pub(crate) budget: Option<Arc<Semaphore>>,
}

/// Poll loop of a single task type
pub(crate) struct WorkerPoller {
    shared: Arc<Shared>,
    worker: watch::Receiver<Worker>,
    status: Arc<WorkerStatus>,
}

impl WorkerPoller {
    pub(crate) fn new(
        shared: Arc<Shared>,
        worker: watch::Receiver<Worker>,
        status: Arc<WorkerStatus>,
    ) -> Self {
        Self {
            shared,
            worker,
            status,
        }
    }

    /// Runs until the runner shuts down or the worker's base context is
    /// cancelled
    ///
    /// The latest registered descriptor is picked up at the start of every
    /// iteration.
    pub(crate) async fn run(mut self) {
        let task_name = self.worker.borrow().task_name().to_string();
        info!("Starting poll loop for task {}", task_name);

        loop {
            let worker = {
                let _lifecycle = self.status.lock_lifecycle();
                let worker = self.worker.borrow_and_update().clone();
                if self.should_stop(&worker) {
                    self.status.set_state(WorkerState::Stopped);
                    break;
                }
                worker
            };
            let options = worker.options();
            let base = options.base_context.as_deref().cloned();

            if self.status.is_paused() {
                self.status.set_state(WorkerState::Idle);
                self.pause_for(options.poll_interval, base).await;
                continue;
            }

            let wanted = options.batch_size.saturating_sub(self.status.in_flight());
            if wanted == 0 {
                self.status.set_state(WorkerState::AwaitingCompletion);
                self.await_slot(options.poll_interval, base).await;
                continue;
            }

            let budget = self.shared.budget.clone();
            let mut permits = match budget {
                None => None,
                Some(budget) => match self.reserve_permits(budget, wanted, base.clone()).await {
                    Some(permits) => Some(permits),
                    None => continue,
                },
            };
            let count = permits.as_ref().map_or(wanted, Vec::len);

            self.status.set_state(WorkerState::Polling);
            let query = PollQuery::new(worker.task_name(), &self.shared.worker_id, count)
                .with_domain(options.domain.clone())
                .with_timeout(options.poll_timeout.as_duration());

            debug!("Polling for up to {} task(s) of {}", count, task_name);

            let tasks = match self.shared.repository.poll_tasks(&query).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!("Failed to poll tasks of {}: {}", task_name, e);
                    drop(permits);
                    self.status.set_state(WorkerState::Idle);
                    self.pause_for(options.poll_interval, base).await;
                    continue;
                }
            };

            if tasks.is_empty() {
                debug!("No tasks available for {}", task_name);
                drop(permits);
                self.status.set_state(WorkerState::Idle);
                self.pause_for(options.poll_interval, base).await;
                continue;
            }

            if tasks.len() > count {
                warn!(
                    "Server returned {} task(s) of {} for a batch of {}",
                    tasks.len(),
                    task_name,
                    count
                );
            }

            self.status.set_state(WorkerState::Dispatching);
            info!("Leased {} task(s) of {}", tasks.len(), task_name);

            let parent = base.unwrap_or_else(|| self.shared.shutdown.clone());
            for task in tasks {
                let permit = permits.as_mut().and_then(Vec::pop);
                self.dispatch(&worker, task, &parent, permit);
            }
        }

        info!("Poll loop for task {} stopped", task_name);
    }

    fn should_stop(&self, worker: &Worker) -> bool {
        self.shared.shutdown.is_cancelled()
            || worker
                .options()
                .base_context
                .is_some_and(|token| token.is_cancelled())
    }

    /// Takes between one and `wanted` permits from the runner budget
    ///
    /// Waits in the semaphore's FIFO queue for the first permit, so a worker
    /// with an empty queue cannot keep the budget from the others. Returns
    /// `None` when the wait was cut short by cancellation or a new
    /// descriptor.
    async fn reserve_permits(
        &mut self,
        budget: Arc<Semaphore>,
        wanted: usize,
        base: Option<CancellationToken>,
    ) -> Option<Vec<OwnedSemaphorePermit>> {
        let first = match Arc::clone(&budget).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(
                    "Runner is at capacity, task {} waits",
                    self.worker.borrow().task_name()
                );
                self.status.set_state(WorkerState::AwaitingCompletion);

                let base = base.unwrap_or_default();
                tokio::select! {
                    permit = Arc::clone(&budget).acquire_owned() => permit.ok()?,
                    Ok(()) = self.worker.changed() => return None,
                    _ = self.shared.shutdown.cancelled() => return None,
                    _ = base.cancelled() => return None,
                }
            }
        };

        let mut permits = vec![first];
        permits.extend(
            (1..wanted).map_while(|_| Arc::clone(&budget).try_acquire_owned().ok()),
        );
        Some(permits)
    }

    /// Sleeps for `interval`, waking early on a new descriptor or on
    /// cancellation
    async fn pause_for(&mut self, interval: Duration, base: Option<CancellationToken>) {
        let base = base.unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            Ok(()) = self.worker.changed() => {}
            _ = self.shared.shutdown.cancelled() => {}
            _ = base.cancelled() => {}
        }
    }

    /// Waits until a dispatched task of this worker finishes
    async fn await_slot(&mut self, interval: Duration, base: Option<CancellationToken>) {
        let base = base.unwrap_or_default();
        tokio::select! {
            _ = self.status.slot_freed.notified() => {}
            _ = tokio::time::sleep(interval) => {}
            Ok(()) = self.worker.changed() => {}
            _ = self.shared.shutdown.cancelled() => {}
            _ = base.cancelled() => {}
        }
    }

    fn dispatch(
        &self,
        worker: &Worker,
        task: Task,
        parent: &CancellationToken,
        permit: Option<OwnedSemaphorePermit>,
    ) {
        let guard = InFlightGuard::acquire(&self.status);
        let context = TaskContext::new(&task, parent);

        self.shared.tracker.spawn(execute_task(
            Arc::clone(&self.shared),
            worker.clone(),
            task,
            context,
            guard,
            permit,
        ));
    }
}

/// Runs the handler for one task and reports its outcome
///
/// The batch slot and the budget permit are released once the result has
/// been reported. The context is cancelled as soon as the handler returns,
/// which also ends any timers derived from it.
async fn execute_task(
    shared: Arc<Shared>,
    worker: Worker,
    task: Task,
    context: TaskContext,
    _guard: InFlightGuard,
    _permit: Option<OwnedSemaphorePermit>,
) {
    info!("Executing task {} ({})", task.task_id, task.def_name());

    let finished = context.cancellation_token().clone().drop_guard();
    let invocation = {
        let task = task.clone();
        let context = context.clone();
        tokio::spawn(async move { worker.execute(task, context).await })
    };

    let result = match invocation.await {
        Ok(result) => result,
        Err(e) => {
            let e = WorkerError::from_join_error(e);
            error!("Handler for task {} aborted: {}", task.task_id, e);
            Err(e)
        }
    };
    drop(finished);

    let outcome = ExecutionOutcome::from_result(result);
    shared
        .reporter
        .report(&task, outcome, context.drain_logs())
        .await;
}
