//! Run Service
//!
//! Business logic for starting, querying and cancelling pipeline runs.

use hoist_core::domain::run::{PipelineRun, Trigger};
use hoist_core::dto::run::{PushEvent, RunSummary};
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::run_repository;
use crate::service::launcher::RunLauncher;
use crate::store::RunStore;

/// Service error type
#[derive(Debug)]
pub enum RunError {
    NotFound(Uuid),
    InvalidState(String),
}

/// Decides whether a push starts a run
///
/// Returns the trigger for pushes to `branch`, or the reason the push is
/// ignored.
pub fn trigger_for_push(event: PushEvent, branch: &str) -> Result<Trigger, String> {
    let Some(pushed) = event.branch() else {
        return Err(format!("{} is not a branch", event.git_ref));
    };

    if pushed != branch {
        return Err(format!("push to {} does not deploy", pushed));
    }

    // Forges report a deleted branch as a push of the all-zero commit
    if event.after.is_empty() || event.after.chars().all(|c| c == '0') {
        return Err("branch deletion does not deploy".to_string());
    }

    event
        .into_trigger()
        .ok_or_else(|| "push carries no branch".to_string())
}

/// Create a run for the trigger and start executing it
pub async fn launch_run(
    store: &RunStore,
    launcher: &Arc<RunLauncher>,
    trigger: Trigger,
) -> PipelineRun {
    let run = PipelineRun::new(trigger);
    let cancel = run_repository::create(store, &run).await;

    tracing::info!(
        "Run {} created for {} on {}",
        run.id,
        run.trigger.commit,
        run.trigger.branch
    );

    launcher.spawn(store.clone(), run.clone(), cancel);
    run
}

/// Get a run by ID
pub async fn get_run(store: &RunStore, id: Uuid) -> Result<PipelineRun, RunError> {
    run_repository::find_by_id(store, id)
        .await
        .ok_or(RunError::NotFound(id))
}

/// List all runs, newest first
pub async fn list_runs(store: &RunStore) -> Vec<RunSummary> {
    run_repository::list_all(store)
        .await
        .iter()
        .map(RunSummary::from)
        .collect()
}

/// Request cancellation of a run
///
/// The step in progress finishes; the run fails before the next one starts.
pub async fn cancel_run(store: &RunStore, id: Uuid) -> Result<PipelineRun, RunError> {
    let run = get_run(store, id).await?;

    if run.is_terminal() {
        return Err(RunError::InvalidState(format!(
            "Run {} already finished as {}",
            id, run.state
        )));
    }

    let token = run_repository::find_cancel_token(store, id)
        .await
        .ok_or(RunError::NotFound(id))?;
    token.cancel();

    tracing::info!("Cancellation requested for run {}", id);
    Ok(run)
}
