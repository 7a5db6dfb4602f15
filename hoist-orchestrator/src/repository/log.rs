//! Log Repository
//!
//! Handles all store operations related to run logs.

use hoist_core::domain::log::LogEntry;
use uuid::Uuid;

use crate::store::RunStore;

/// Add log entries for a run
///
/// Returns false when the run does not exist.
pub async fn add_entries(store: &RunStore, run_id: Uuid, entries: Vec<LogEntry>) -> bool {
    match store.write().await.get_mut(&run_id) {
        Some(record) => {
            record.logs.extend(entries);
            true
        }
        None => false,
    }
}

/// Get all log entries for a run, oldest first
pub async fn find_by_run(store: &RunStore, run_id: Uuid) -> Option<Vec<LogEntry>> {
    store.read().await.get(&run_id).map(|r| r.logs.clone())
}
