//! Run Repository
//!
//! Handles all store operations related to pipeline runs.

use hoist_core::domain::run::PipelineRun;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::store::{RunRecord, RunStore};

/// Inserts a new run and returns its cancellation token
///
/// Evicts the oldest finished runs, with their logs, once the store holds
/// more than its retention bound.
pub async fn create(store: &RunStore, run: &PipelineRun) -> CancellationToken {
    let cancel = CancellationToken::new();
    let mut records = store.write().await;
    records.insert(
        run.id,
        RunRecord {
            run: run.clone(),
            logs: Vec::new(),
            cancel: cancel.clone(),
        },
    );

    let excess = records.len().saturating_sub(store.max_runs());
    if excess > 0 {
        let mut finished: Vec<_> = records
            .values()
            .filter(|r| r.run.is_terminal())
            .map(|r| (r.run.created_at, r.run.id))
            .collect();
        finished.sort();

        for (_, id) in finished.into_iter().take(excess) {
            records.remove(&id);
            tracing::debug!("Evicted run {}", id);
        }
    }

    cancel
}

/// Find a run by ID
pub async fn find_by_id(store: &RunStore, id: Uuid) -> Option<PipelineRun> {
    store.read().await.get(&id).map(|r| r.run.clone())
}

/// List all runs, newest first
pub async fn list_all(store: &RunStore) -> Vec<PipelineRun> {
    let mut runs: Vec<PipelineRun> = store
        .read()
        .await
        .values()
        .map(|r| r.run.clone())
        .collect();
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    runs
}

/// Replaces the stored snapshot of a run
///
/// A stored run that is already terminal is never overwritten. Returns
/// whether the snapshot was stored.
pub async fn update(store: &RunStore, run: &PipelineRun) -> bool {
    let mut records = store.write().await;
    match records.get_mut(&run.id) {
        Some(record) if !record.run.is_terminal() => {
            record.run = run.clone();
            true
        }
        _ => false,
    }
}

/// Get the cancellation token of a run
pub async fn find_cancel_token(store: &RunStore, id: Uuid) -> Option<CancellationToken> {
    store.read().await.get(&id).map(|r| r.cancel.clone())
}
