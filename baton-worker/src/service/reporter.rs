//! Result reporter
//!
//! Sends task outcomes back to the server. A report that fails on a
//! transport error or a server-side error is retried with exponential
//! backoff; a rejected report (4xx) is not. When every attempt fails the
//! task is left to the server's lease timeout.

use baton_core::domain::task::{Task, TaskExecLog};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::execution::ExecutionOutcome;
use crate::repository::TaskRepository;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Posts execution outcomes through a [`TaskRepository`]
#[derive(Clone)]
pub struct ResultReporter {
    repository: Arc<dyn TaskRepository>,
    worker_id: String,
    retry_count: u32,
    retry_delay: Duration,
}

impl ResultReporter {
    pub fn new(repository: Arc<dyn TaskRepository>, config: &RunnerConfig) -> Self {
        Self {
            repository,
            worker_id: config.worker_id.clone(),
            retry_count: config.update_retry_count,
            retry_delay: config.update_retry_delay,
        }
    }

    /// Reports the outcome of `task`
    ///
    /// Returns whether the server accepted the result. Failures are logged
    /// here; callers only need the flag.
    pub async fn report(&self, task: &Task, outcome: ExecutionOutcome, logs: Vec<TaskExecLog>) -> bool {
        match &outcome {
            ExecutionOutcome::Completed(_) => {
                info!("Task {} ({}) completed", task.task_id, task.def_name());
            }
            ExecutionOutcome::Failed { reason, terminal } => {
                warn!(
                    "Task {} ({}) failed{}: {}",
                    task.task_id,
                    task.def_name(),
                    if *terminal { " terminally" } else { "" },
                    reason
                );
            }
        }

        let result = outcome.into_task_result(task, &self.worker_id, logs);
        let mut attempt = 0;
        let mut delay = self.retry_delay;

        loop {
            attempt += 1;

            match self.repository.update_task(&result).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(
                            "Reported result of task {} after {} attempt(s)",
                            task.task_id, attempt
                        );
                    } else {
                        debug!("Reported result of task {}", task.task_id);
                    }
                    return true;
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        "Server rejected result of task {}, not retrying: {}",
                        task.task_id, e
                    );
                    return false;
                }
                Err(e) => {
                    if attempt > self.retry_count {
                        error!(
                            "Failed to report result of task {} after {} attempt(s): {}",
                            task.task_id, attempt, e
                        );
                        return false;
                    }

                    warn!(
                        "Failed to report result of task {} (attempt {}/{}): {}. Retrying in {:?}",
                        task.task_id,
                        attempt,
                        self.retry_count + 1,
                        e,
                        delay
                    );

                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }
}
