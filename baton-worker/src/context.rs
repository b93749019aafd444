//! Task context
//!
//! Per-invocation handle given to handlers. It exposes the identity of the
//! task being executed, a log buffer whose entries travel with the task
//! result, and a cancellation token tied to the runner's lifecycle.

use baton_core::domain::task::{Task, TaskExecLog};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Execution context of a single handler invocation
///
/// Cloning is cheap; clones share the same token and log buffer.
#[derive(Clone)]
pub struct TaskContext {
    inner: Arc<Inner>,
}

struct Inner {
    task_id: String,
    task_def_name: String,
    workflow_instance_id: String,
    retry_count: u32,
    input: Option<Map<String, Value>>,
    token: CancellationToken,
    logs: Mutex<Vec<TaskExecLog>>,
}

impl TaskContext {
    /// Creates a context for `task` whose cancellation follows `parent`
    ///
    /// The context carries no deadline of its own.
    pub fn new(task: &Task, parent: &CancellationToken) -> Self {
        Self::with_token(task, parent.child_token())
    }

    /// Creates a context that is only cancelled through its own token
    pub fn detached(task: &Task) -> Self {
        Self::with_token(task, CancellationToken::new())
    }

    fn with_token(task: &Task, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                task_id: task.task_id.clone(),
                task_def_name: task.def_name().to_string(),
                workflow_instance_id: task.workflow_instance_id.clone(),
                retry_count: task.retry_count,
                input: task.input_data.clone(),
                token,
                logs: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    pub fn task_def_name(&self) -> &str {
        &self.inner.task_def_name
    }

    pub fn workflow_instance_id(&self) -> &str {
        &self.inner.workflow_instance_id
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.retry_count
    }

    /// Raw input payload of the task
    pub fn input(&self) -> Option<&Map<String, Value>> {
        self.inner.input.as_ref()
    }

    // =============================================================================
    // Cancellation
    // =============================================================================

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once the runner (or the worker's base context) is shut down
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Derives a token cancelled whenever this context is
    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    /// Derives a token cancelled when this context is, or after `timeout`,
    /// whichever comes first
    ///
    /// Must be called from within a Tokio runtime.
    pub fn child_with_timeout(&self, timeout: Duration) -> CancellationToken {
        let child = self.inner.token.child_token();
        let timer = child.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => timer.cancel(),
                _ = timer.cancelled() => {}
            }
        });

        child
    }

    // =============================================================================
    // Execution Logs
    // =============================================================================

    /// Appends a log line that is attached to the task result
    pub fn log(&self, message: impl Into<String>) {
        let entry = TaskExecLog::new(self.inner.task_id.clone(), message);
        self.lock_logs().push(entry);
    }

    /// Drains all buffered log lines
    pub(crate) fn drain_logs(&self) -> Vec<TaskExecLog> {
        self.lock_logs().drain(..).collect()
    }

    fn lock_logs(&self) -> std::sync::MutexGuard<'_, Vec<TaskExecLog>> {
        // Entries stay usable after a handler panic
        self.inner
            .logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.inner.task_id)
            .field("task_def_name", &self.inner.task_def_name)
            .field("workflow_instance_id", &self.inner.workflow_instance_id)
            .field("retry_count", &self.inner.retry_count)
            .field("cancelled", &self.inner.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task() -> Task {
        Task {
            task_id: "t-1".to_string(),
            task_def_name: "greet".to_string(),
            workflow_instance_id: "wf-1".to_string(),
            retry_count: 2,
            input_data: json!({"name": "X"}).as_object().cloned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_accessors() {
        let ctx = TaskContext::detached(&sample_task());
        assert_eq!(ctx.task_id(), "t-1");
        assert_eq!(ctx.task_def_name(), "greet");
        assert_eq!(ctx.workflow_instance_id(), "wf-1");
        assert_eq!(ctx.retry_count(), 2);
        assert_eq!(ctx.input().unwrap()["name"], json!("X"));
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_cancellation_propagates_from_parent() {
        let parent = CancellationToken::new();
        let ctx = TaskContext::new(&sample_task(), &parent);
        let child = ctx.child_token();

        parent.cancel();

        assert!(ctx.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_cancellation_does_not_reach_context() {
        let ctx = TaskContext::detached(&sample_task());
        let child = ctx.child_token();

        child.cancel();

        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_with_timeout_fires() {
        let ctx = TaskContext::detached(&sample_task());
        let deadline = ctx.child_with_timeout(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(2), deadline.cancelled())
            .await
            .expect("deadline token should be cancelled");
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_logs_are_shared_between_clones_and_drained() {
        let ctx = TaskContext::detached(&sample_task());
        let clone = ctx.clone();

        ctx.log("starting");
        clone.log("done");

        let logs = ctx.drain_logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].log, "starting");
        assert_eq!(logs[1].task_id, "t-1");
        assert!(ctx.drain_logs().is_empty());
    }
}
