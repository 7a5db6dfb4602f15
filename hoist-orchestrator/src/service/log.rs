//! Log Service
//!
//! Business logic for run log storage and retrieval.

use hoist_core::domain::log::LogEntry;
use uuid::Uuid;

use crate::repository::log_repository;
use crate::store::RunStore;

/// Service error type
#[derive(Debug)]
pub enum LogError {
    RunNotFound(Uuid),
}

/// Append log entries to a run
pub async fn add_log_entries(
    store: &RunStore,
    run_id: Uuid,
    entries: Vec<LogEntry>,
) -> Result<(), LogError> {
    if entries.is_empty() {
        return Ok(());
    }

    if !log_repository::add_entries(store, run_id, entries).await {
        return Err(LogError::RunNotFound(run_id));
    }
    Ok(())
}

/// Get all logs of a run
pub async fn get_run_logs(store: &RunStore, run_id: Uuid) -> Result<Vec<LogEntry>, LogError> {
    log_repository::find_by_run(store, run_id)
        .await
        .ok_or(LogError::RunNotFound(run_id))
}
