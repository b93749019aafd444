//! Task domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A unit of work leased from the server's task queue.
///
/// Tasks are created server-side when a workflow schedules them and are
/// handed to exactly one poller. The worker must answer with a
/// [`TaskResult`]; unanswered tasks expire on the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub task_def_name: String,
    #[serde(default)]
    pub workflow_instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_task_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Input payload. `None` when the server sent no input or an explicit null.
    #[serde(default)]
    pub input_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub poll_count: u32,
    /// When the task was handed to a poller (epoch millis on the wire)
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Name of the task definition, falling back to the task type when the
    /// server omitted it.
    pub fn def_name(&self) -> &str {
        if self.task_def_name.is_empty() {
            &self.task_type
        } else {
            &self.task_def_name
        }
    }
}

/// Status a worker can report for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResultStatus {
    InProgress,
    Completed,
    Failed,
    /// Failed in a way the server must not retry
    FailedWithTerminalError,
}

/// Outcome of a task execution, as posted back to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub workflow_instance_id: String,
    pub task_id: String,
    pub worker_id: String,
    pub status: TaskResultStatus,
    #[serde(default)]
    pub output_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_for_incompletion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<TaskExecLog>,
}

impl TaskResult {
    /// Builds a completion result carrying `output` as the task output
    pub fn completed(task: &Task, worker_id: impl Into<String>, output: Map<String, Value>) -> Self {
        Self {
            workflow_instance_id: task.workflow_instance_id.clone(),
            task_id: task.task_id.clone(),
            worker_id: worker_id.into(),
            status: TaskResultStatus::Completed,
            output_data: output,
            reason_for_incompletion: None,
            logs: Vec::new(),
        }
    }

    /// Builds a failure result carrying `reason` as the failure reason
    pub fn failed(task: &Task, worker_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            workflow_instance_id: task.workflow_instance_id.clone(),
            task_id: task.task_id.clone(),
            worker_id: worker_id.into(),
            status: TaskResultStatus::Failed,
            output_data: Map::new(),
            reason_for_incompletion: Some(reason.into()),
            logs: Vec::new(),
        }
    }

    /// Marks a failure as terminal so the server does not retry the task
    pub fn terminal(mut self) -> Self {
        if self.status == TaskResultStatus::Failed {
            self.status = TaskResultStatus::FailedWithTerminalError;
        }
        self
    }

    /// Attaches execution logs to the result
    pub fn with_logs(mut self, logs: Vec<TaskExecLog>) -> Self {
        self.logs = logs;
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.status,
            TaskResultStatus::Failed | TaskResultStatus::FailedWithTerminalError
        )
    }
}

/// A log line emitted by a handler while executing a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecLog {
    pub log: String,
    pub task_id: String,
    /// Epoch millis
    pub created_time: i64,
}

impl TaskExecLog {
    pub fn new(task_id: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            task_id: task_id.into(),
            created_time: Utc::now().timestamp_millis(),
        }
    }
}
