//! Task-related API endpoints

use crate::ServerClient;
use crate::error::{ClientError, Result};
use baton_core::domain::task::{Task, TaskResult};
use baton_core::dto::task::PollQuery;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Extra time granted to the HTTP request on top of the server-side
/// long-poll timeout before the client gives up on it.
const POLL_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

impl ServerClient {
    // =============================================================================
    // Task Polling
    // =============================================================================

    /// Lease up to `query.count` tasks of type `query.task_type`
    ///
    /// An empty queue is not an error: the server answers with an empty batch
    /// (or no content) and this returns an empty vector.
    ///
    /// # Example
    /// ```no_run
    /// # use baton_client::ServerClient;
    /// # use baton_core::dto::task::PollQuery;
    /// # use std::time::Duration;
    /// # async fn example() -> baton_client::Result<()> {
    /// let client = ServerClient::new("http://localhost:8080/api");
    /// let query = PollQuery::new("greet", "worker-1", 10)
    ///     .with_domain(Some("blue".to_string()))
    ///     .with_timeout(Some(Duration::from_millis(500)));
    /// let tasks = client.poll_tasks(&query).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn poll_tasks(&self, query: &PollQuery) -> Result<Vec<Task>> {
        if query.task_type.is_empty() {
            return Err(ClientError::InvalidRequest(
                "task type cannot be empty".to_string(),
            ));
        }

        let url = format!("{}/tasks/poll/batch/{}", self.base_url, query.task_type);

        let mut params: Vec<(&str, String)> = vec![
            ("workerid", query.worker_id.clone()),
            ("count", query.count.to_string()),
        ];
        if let Some(domain) = &query.domain {
            params.push(("domain", domain.clone()));
        }
        if let Some(timeout) = query.timeout {
            params.push(("timeout", timeout.as_millis().to_string()));
        }

        let mut request = self.client.get(&url).query(&params);
        if let Some(timeout) = query.timeout {
            request = request.timeout(timeout + POLL_TIMEOUT_SLACK);
        }

        let response = request.send().await?;
        let tasks: Vec<Task> = self.handle_optional_response(response).await?;

        debug!(
            "Polled {} task(s) of type '{}'",
            tasks.len(),
            query.task_type
        );

        Ok(tasks)
    }

    // =============================================================================
    // Task Updates
    // =============================================================================

    /// Post a task result back to the server
    ///
    /// # Arguments
    /// * `result` - The completion or failure report
    pub async fn update_task(&self, result: &TaskResult) -> Result<()> {
        let url = format!("{}/tasks", self.base_url);
        let response = self.client.post(&url).json(result).send().await?;

        self.handle_empty_response(response).await
    }

    /// Report a task as completed with `output` as its output payload
    pub async fn update_task_completion(
        &self,
        task: &Task,
        worker_id: &str,
        output: Map<String, Value>,
    ) -> Result<()> {
        self.update_task(&TaskResult::completed(task, worker_id, output))
            .await
    }

    /// Report a task as failed with `reason` as its failure reason
    pub async fn update_task_failure(&self, task: &Task, worker_id: &str, reason: &str) -> Result<()> {
        self.update_task(&TaskResult::failed(task, worker_id, reason))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn sample_task() -> Task {
        Task {
            task_id: "t-1".to_string(),
            task_def_name: "greet".to_string(),
            workflow_instance_id: "wf-1".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_poll_tasks_sends_query_and_decodes_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tasks/poll/batch/greet")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("workerid".into(), "worker-1".into()),
                Matcher::UrlEncoded("count".into(), "3".into()),
                Matcher::UrlEncoded("domain".into(), "blue".into()),
                Matcher::UrlEncoded("timeout".into(), "250".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"taskId": "t-1", "taskDefName": "greet", "workflowInstanceId": "wf-1",
                     "inputData": {"name": "X"}},
                    {"taskId": "t-2", "taskDefName": "greet", "workflowInstanceId": "wf-2"}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = ServerClient::new(server.url());
        let query = PollQuery::new("greet", "worker-1", 3)
            .with_domain(Some("blue".to_string()))
            .with_timeout(Some(Duration::from_millis(250)));

        let tasks = client.poll_tasks(&query).await.unwrap();

        mock.assert_async().await;
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].input_data.as_ref().unwrap()["name"], json!("X"));
        assert!(tasks[1].input_data.is_none());
    }

    #[tokio::test]
    async fn test_poll_tasks_omits_unset_domain_and_timeout() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tasks/poll/batch/greet")
            .match_query(Matcher::Exact("workerid=worker-1&count=1".to_string()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = ServerClient::new(server.url());
        let tasks = client
            .poll_tasks(&PollQuery::new("greet", "worker-1", 1))
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_poll_tasks_no_content_is_empty_batch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/tasks/poll/batch/greet")
            .match_query(Matcher::Any)
            .with_status(204)
            .create_async()
            .await;

        let client = ServerClient::new(server.url());
        let tasks = client
            .poll_tasks(&PollQuery::new("greet", "worker-1", 1))
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_poll_tasks_maps_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/tasks/poll/batch/greet")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;

        let client = ServerClient::new(server.url());
        let err = client
            .poll_tasks(&PollQuery::new("greet", "worker-1", 1))
            .await
            .unwrap_err();

        assert!(err.is_server_error());
        assert!(err.to_string().contains("unavailable"));
    }

    #[tokio::test]
    async fn test_poll_tasks_rejects_empty_task_type() {
        let client = ServerClient::new("http://localhost:1");
        let err = client
            .poll_tasks(&PollQuery::new("", "worker-1", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_update_task_completion_posts_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tasks")
            .match_body(Matcher::PartialJson(json!({
                "taskId": "t-1",
                "workflowInstanceId": "wf-1",
                "workerId": "worker-1",
                "status": "COMPLETED",
                "outputData": {"greetings": "Hello, X"}
            })))
            .with_status(200)
            .with_body("t-1")
            .create_async()
            .await;

        let client = ServerClient::new(server.url());
        let mut output = Map::new();
        output.insert("greetings".to_string(), json!("Hello, X"));

        client
            .update_task_completion(&sample_task(), "worker-1", output)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_task_failure_posts_reason() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tasks")
            .match_body(Matcher::PartialJson(json!({
                "taskId": "t-1",
                "status": "FAILED",
                "reasonForIncompletion": "boom"
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = ServerClient::new(server.url());
        client
            .update_task_failure(&sample_task(), "worker-1", "boom")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_task_maps_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/tasks")
            .with_status(404)
            .with_body("task not found")
            .create_async()
            .await;

        let client = ServerClient::new(server.url());
        let err = client
            .update_task(&TaskResult::failed(&sample_task(), "worker-1", "x"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }
}
