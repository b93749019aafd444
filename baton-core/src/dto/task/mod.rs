//! Task DTOs for worker-to-server communication

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of a batch poll request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollQuery {
    /// Task definition name to lease work for
    pub task_type: String,
    pub worker_id: String,
    /// Maximum number of tasks to lease
    pub count: usize,
    /// Queue partition; `None` polls the default queue
    pub domain: Option<String>,
    /// How long the server may hold the request open; `None` defers to the
    /// server default
    pub timeout: Option<Duration>,
}

impl PollQuery {
    pub fn new(task_type: impl Into<String>, worker_id: impl Into<String>, count: usize) -> Self {
        Self {
            task_type: task_type.into(),
            worker_id: worker_id.into(),
            count,
            domain: None,
            timeout: None,
        }
    }

    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain.filter(|d| !d.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}
