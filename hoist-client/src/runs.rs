//! Run-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use hoist_core::domain::log::LogEntry;
use hoist_core::domain::run::PipelineRun;
use hoist_core::dto::run::{PushEvent, RunSummary, WebhookAck};
use uuid::Uuid;

/// Header carrying the shared webhook secret
const TOKEN_HEADER: &str = "X-Hoist-Token";

impl OrchestratorClient {
    // =============================================================================
    // Trigger
    // =============================================================================

    /// Sends a push event, as a forge webhook would
    ///
    /// # Arguments
    /// * `event` - The push (ref and commit)
    /// * `token` - Webhook secret, when the orchestrator requires one
    ///
    /// # Returns
    /// Whether a run was started, and its id
    pub async fn trigger_push(&self, event: &PushEvent, token: Option<&str>) -> Result<WebhookAck> {
        let url = self.url("/webhook/push");
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(&url).json(event);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        let response = request.send().await?;

        Self::decode(response).await
    }

    // =============================================================================
    // Runs
    // =============================================================================

    /// List all runs, newest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let url = self.url("/run/list");
        let response = self.client.get(&url).send().await?;

        Self::decode(response).await
    }

    /// Get a run by ID
    pub async fn get_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let url = self.url(&format!("/run/{}", run_id));
        let response = self.client.get(&url).send().await?;

        Self::decode(response).await
    }

    /// Get all logs of a run, oldest first
    pub async fn get_run_logs(&self, run_id: Uuid) -> Result<Vec<LogEntry>> {
        let url = self.url(&format!("/run/{}/logs", run_id));
        let response = self.client.get(&url).send().await?;

        Self::decode(response).await
    }

    /// Request cancellation of a run
    ///
    /// Fails with status 409 when the run already finished.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let url = self.url(&format!("/run/{}/cancel", run_id));
        let response = self.client.post(&url).send().await?;

        Self::decode(response).await
    }

    /// Checks that the orchestrator is up
    pub async fn health(&self) -> Result<()> {
        let url = self.url("/health");
        let response = self.client.get(&url).send().await?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::domain::run::{RunState, Trigger};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_trigger_push_sends_token() {
        let server = MockServer::start().await;
        let run_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/webhook/push"))
            .and(header("x-hoist-token", "hook-secret"))
            .and(body_json(json!({ "ref": "refs/heads/main", "after": "9f1c2d3" })))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(WebhookAck::started(run_id)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = OrchestratorClient::new(server.uri());
        let event = PushEvent {
            git_ref: "refs/heads/main".to_string(),
            after: "9f1c2d3".to_string(),
        };
        let ack = client.trigger_push(&event, Some("hook-secret")).await.unwrap();

        assert!(!ack.ignored);
        assert_eq!(ack.run_id, Some(run_id));
    }

    #[tokio::test]
    async fn test_get_run() {
        let server = MockServer::start().await;
        let run = PipelineRun::new(Trigger::push("9f1c2d3", "main"));
        Mock::given(method("GET"))
            .and(path(format!("/run/{}", run.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(&run))
            .mount(&server)
            .await;

        let client = OrchestratorClient::new(server.uri());
        let fetched = client.get_run(run.id).await.unwrap();
        assert_eq!(fetched.id, run.id);
        assert_eq!(fetched.state, RunState::Triggered);
    }

    #[tokio::test]
    async fn test_missing_run_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "error": "Run x not found" })),
            )
            .mount(&server)
            .await;

        let client = OrchestratorClient::new(server.uri());
        let err = client.get_run(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Run x not found"));
    }

    #[tokio::test]
    async fn test_cancel_finished_run_is_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(json!({ "error": "Run already finished as Succeeded" })),
            )
            .mount(&server)
            .await;

        let client = OrchestratorClient::new(server.uri());
        let err = client.cancel_run(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/push"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid webhook token" })),
            )
            .mount(&server)
            .await;

        let client = OrchestratorClient::new(server.uri());
        let event = PushEvent {
            git_ref: "refs/heads/main".to_string(),
            after: "9f1c2d3".to_string(),
        };
        let err = client.trigger_push(&event, Some("wrong")).await.unwrap_err();
        assert!(matches!(err, crate::ClientError::Unauthorized(ref m) if m == "Invalid webhook token"));
    }
}
