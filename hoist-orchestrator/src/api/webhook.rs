//! Webhook API Handler
//!
//! Receives push notifications from the source forge.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use hoist_core::dto::run::{PushEvent, WebhookAck};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::run_service;

/// Header carrying the shared webhook secret
pub const TOKEN_HEADER: &str = "x-hoist-token";

/// POST /webhook/push
/// Start a run for a push to the deploy branch
pub async fn push(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<PushEvent>,
) -> ApiResult<(StatusCode, Json<WebhookAck>)> {
    if let Some(secret) = &state.webhook_secret {
        let presented = headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secret.matches(presented) {
            return Err(ApiError::Unauthorized);
        }
    }

    tracing::info!("Push received: {} at {}", event.git_ref, event.after);

    let trigger = match run_service::trigger_for_push(event, &state.branch) {
        Ok(trigger) => trigger,
        Err(reason) => {
            tracing::info!("Push ignored: {}", reason);
            return Ok((StatusCode::OK, Json(WebhookAck::ignored(reason))));
        }
    };

    let run = run_service::launch_run(&state.store, &state.launcher, trigger).await;
    Ok((StatusCode::ACCEPTED, Json(WebhookAck::started(run.id))))
}
