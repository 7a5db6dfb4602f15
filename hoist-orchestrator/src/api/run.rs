//! Run API Handlers
//!
//! HTTP endpoints for querying and cancelling runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use hoist_core::domain::log::LogEntry;
use hoist_core::domain::run::PipelineRun;
use hoist_core::dto::run::RunSummary;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::{log_service, run_service};

/// GET /run/list
/// List all runs, newest first
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    tracing::debug!("Listing runs");
    Json(run_service::list_runs(&state.store).await)
}

/// GET /run/{id}
/// Get run details by ID
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRun>> {
    tracing::debug!("Getting run: {}", id);

    let run = run_service::get_run(&state.store, id).await?;
    Ok(Json(run))
}

/// GET /run/{id}/logs
/// Get all logs for a run
pub async fn get_run_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    tracing::debug!("Getting logs for run: {}", id);

    let logs = log_service::get_run_logs(&state.store, id).await?;
    Ok(Json(logs))
}

/// POST /run/{id}/cancel
/// Request cancellation; takes effect before the next step starts
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<PipelineRun>)> {
    tracing::info!("Cancelling run: {}", id);

    let run = run_service::cancel_run(&state.store, id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}
