//! Execution outcomes
//!
//! These types only exist between a handler returning and its result being
//! reported. They decide how a handler's return value maps onto the task
//! result sent to the server.

use baton_core::domain::task::{Task, TaskExecLog, TaskResult};
use serde_json::{Map, Value};

use crate::error::WorkerError;

/// What happened when a handler ran
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed(Value),
    Failed {
        reason: String,
        /// The server should not schedule a retry
        terminal: bool,
    },
}

impl ExecutionOutcome {
    /// Classifies the return value of a handler invocation
    pub fn from_result(result: Result<Value, WorkerError>) -> Self {
        match result {
            Ok(output) => Self::Completed(output),
            Err(e) => Self::Failed {
                terminal: e.is_terminal(),
                reason: e.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Converts the outcome into the result payload for `task`
    pub fn into_task_result(
        self,
        task: &Task,
        worker_id: &str,
        logs: Vec<TaskExecLog>,
    ) -> TaskResult {
        match self {
            Self::Completed(output) => {
                TaskResult::completed(task, worker_id, output_map(output)).with_logs(logs)
            }
            Self::Failed { reason, terminal } => {
                let result = TaskResult::failed(task, worker_id, reason).with_logs(logs);
                if terminal { result.terminal() } else { result }
            }
        }
    }
}

/// Task output on the wire is always an object
///
/// `null` becomes an empty object, objects pass through and anything else
/// is wrapped under a `result` key.
fn output_map(output: Value) -> Map<String, Value> {
    match output {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}
