//! Tasks repository
//!
//! Handles communication with the server for task-related operations:
//! - Polling batches of tasks
//! - Posting task results

use async_trait::async_trait;
use baton_client::{ClientError, ServerClient};
use baton_core::domain::task::{Task, TaskResult};
use baton_core::dto::task::PollQuery;

/// Repository trait for task-related operations with the server
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Leases up to `query.count` tasks of `query.task_type`
    ///
    /// An empty batch is a normal outcome.
    async fn poll_tasks(&self, query: &PollQuery) -> Result<Vec<Task>, ClientError>;

    /// Posts the result of an executed task
    async fn update_task(&self, result: &TaskResult) -> Result<(), ClientError>;
}

#[async_trait]
impl TaskRepository for ServerClient {
    async fn poll_tasks(&self, query: &PollQuery) -> Result<Vec<Task>, ClientError> {
        ServerClient::poll_tasks(self, query).await
    }

    async fn update_task(&self, result: &TaskResult) -> Result<(), ClientError> {
        ServerClient::update_task(self, result).await
    }
}
