//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod run;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post},
};
use hoist_core::domain::credential::Secret;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::RunLauncher;
use crate::store::RunStore;

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: RunStore,
    pub launcher: Arc<RunLauncher>,

    /// Only pushes to this branch start runs
    pub branch: String,

    /// Expected value of the webhook token header, when set
    pub webhook_secret: Option<Arc<Secret>>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Trigger
        .route("/webhook/push", post(webhook::push))
        // Run endpoints
        .route("/run/list", get(run::list_runs))
        .route("/run/{id}", get(run::get_run))
        .route("/run/{id}/logs", get(run::get_run_logs))
        .route("/run/{id}/cancel", post(run::cancel_run))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use hoist_runner::{PipelineExecutor, StepTimeouts};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::service::{SharedDirectory, SourceMode};
    use crate::testing::{HeadAt, instant_stages, secrets};

    fn state(secret: Option<&str>) -> AppState {
        let git = Arc::new(HeadAt("9f1c2d3e8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d"));
        let source = SharedDirectory::new(git, ".");
        let launcher = RunLauncher::new(
            PipelineExecutor::new(instant_stages(), StepTimeouts::default()),
            SourceMode::Directory(source),
            secrets(),
            Duration::from_millis(10),
        );

        AppState {
            store: RunStore::new(),
            launcher: Arc::new(launcher),
            branch: "main".to_string(),
            webhook_secret: secret.map(|s| Arc::new(Secret::new(s))),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn push_request(git_ref: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook/push")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(webhook::TOKEN_HEADER, token);
        }
        builder
            .body(Body::from(
                json!({ "ref": git_ref, "after": "9f1c2d3" }).to_string(),
            ))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Polls until the run reaches a terminal state
    async fn wait_for_terminal(app: &Router, id: &str) -> Value {
        for _ in 0..200 {
            let (_, run) = send(app.clone(), get(&format!("/run/{}", id))).await;
            if run["state"] == "Succeeded" || run["state"] == "Failed" {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} did not finish", id);
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(state(None));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_push_to_branch_runs_pipeline() {
        let app = create_router(state(None));

        let (status, ack) = send(app.clone(), push_request("refs/heads/main", None)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(ack["ignored"], false);
        let id = ack["run_id"].as_str().unwrap().to_string();

        let run = wait_for_terminal(&app, &id).await;
        assert_eq!(run["state"], "Succeeded");
        assert_eq!(run["image"], "docker.io/dhaval/node-app:9f1c2d3");
        assert_eq!(run["steps"].as_array().unwrap().len(), 5);

        // Remaining logs are flushed just after the final state change
        let mut found = false;
        for _ in 0..200 {
            let (status, logs) = send(app.clone(), get(&format!("/run/{}/logs", id))).await;
            assert_eq!(status, StatusCode::OK);
            found = logs
                .as_array()
                .unwrap()
                .iter()
                .any(|e| e["message"] == "added 57 packages");
            if found {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(found);

        let (_, list) = send(app, get("/run/list")).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_push_to_other_branch_is_ignored() {
        let state = state(None);
        let app = create_router(state.clone());

        let (status, ack) = send(app, push_request("refs/heads/feature", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["ignored"], true);
        assert!(state.store.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_push_with_wrong_token_is_rejected() {
        let app = create_router(state(Some("hook-secret")));

        let (status, _) = send(app.clone(), push_request("refs/heads/main", Some("nope"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(app.clone(), push_request("refs/heads/main", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(app.clone(), push_request("refs/heads/main", Some("hook-secreX"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(app, push_request("refs/heads/main", Some("hook-secret"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let app = create_router(state(None));
        let id = uuid::Uuid::new_v4();

        let (status, body) = send(app.clone(), get(&format!("/run/{}", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let (status, _) = send(app, get(&format!("/run/{}/logs", id))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_finished_run_conflicts() {
        let app = create_router(state(None));

        let (_, ack) = send(app.clone(), push_request("refs/heads/main", None)).await;
        let id = ack["run_id"].as_str().unwrap().to_string();
        wait_for_terminal(&app, &id).await;

        let request = Request::builder()
            .method("POST")
            .uri(format!("/run/{}/cancel", id))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
