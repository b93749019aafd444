//! In-memory task queue used by the runner and reporter tests

use async_trait::async_trait;
use baton_client::ClientError;
use baton_core::domain::task::{Task, TaskResult};
use baton_core::dto::task::PollQuery;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::repository::TaskRepository;

/// Builds a task of type `name` with the given input
pub fn task(name: &str, id: &str, input: Value) -> Task {
    Task {
        task_id: id.to_string(),
        task_type: name.to_string(),
        task_def_name: name.to_string(),
        workflow_instance_id: format!("wf-{}", id),
        input_data: input.as_object().cloned(),
        ..Default::default()
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Task>>,
    polls: Vec<PollQuery>,
    results: Vec<TaskResult>,
    poll_failures: VecDeque<ClientError>,
    update_failures: VecDeque<ClientError>,
    update_attempts: usize,
}

/// Task repository that serves tasks from per-type queues and records
/// every poll and every result it receives
#[derive(Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<State>,
    changed: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Task) {
        let mut state = self.state.lock().unwrap();
        state
            .queues
            .entry(task.def_name().to_string())
            .or_default()
            .push_back(task);
    }

    /// The next `poll_tasks` calls fail with these errors, in order; the
    /// failed polls are still recorded
    pub fn fail_next_polls(&self, errors: Vec<ClientError>) {
        self.state.lock().unwrap().poll_failures.extend(errors);
    }

    /// The next `update_task` calls fail with these errors, in order
    pub fn fail_next_updates(&self, errors: Vec<ClientError>) {
        self.state.lock().unwrap().update_failures.extend(errors);
    }

    pub fn polls(&self) -> Vec<PollQuery> {
        self.state.lock().unwrap().polls.clone()
    }

    pub fn polls_for(&self, task_type: &str) -> Vec<PollQuery> {
        self.polls()
            .into_iter()
            .filter(|q| q.task_type == task_type)
            .collect()
    }

    pub fn pending(&self, task_type: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(task_type)
            .map_or(0, VecDeque::len)
    }

    pub fn results(&self) -> Vec<TaskResult> {
        self.state.lock().unwrap().results.clone()
    }

    pub fn update_attempts(&self) -> usize {
        self.state.lock().unwrap().update_attempts
    }

    /// Waits until at least `count` results arrived or `timeout` elapsed,
    /// returning whatever was received
    pub async fn wait_for_results(&self, count: usize, timeout: Duration) -> Vec<TaskResult> {
        self.wait_until(timeout, |state| state.results.len() >= count)
            .await;
        self.results()
    }

    /// Waits until at least `count` polls for `task_type` were made
    pub async fn wait_for_polls(&self, task_type: &str, count: usize, timeout: Duration) -> usize {
        self.wait_until(timeout, |state| {
            state.polls.iter().filter(|q| q.task_type == task_type).count() >= count
        })
        .await;
        self.polls_for(task_type).len()
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn(&State) -> bool) {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if done(&*self.state.lock().unwrap()) {
                return;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskQueue {
    async fn poll_tasks(&self, query: &PollQuery) -> Result<Vec<Task>, ClientError> {
        let batch = {
            let mut state = self.state.lock().unwrap();
            state.polls.push(query.clone());
            match state.poll_failures.pop_front() {
                Some(e) => Err(e),
                None => {
                    let queue = state.queues.entry(query.task_type.clone()).or_default();
                    let take = query.count.min(queue.len());
                    Ok(queue.drain(..take).collect::<Vec<_>>())
                }
            }
        };
        self.changed.notify_waiters();
        batch
    }

    async fn update_task(&self, result: &TaskResult) -> Result<(), ClientError> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.update_attempts += 1;
            match state.update_failures.pop_front() {
                Some(e) => Err(e),
                None => {
                    state.results.push(result.clone());
                    Ok(())
                }
            }
        };
        self.changed.notify_waiters();
        outcome
    }
}
