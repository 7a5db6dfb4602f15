//! In-memory run store
//!
//! Runs live only as long as the orchestrator process. Each record holds the
//! latest snapshot of the run, its accumulated logs, and the token used to
//! cancel it. Finished runs are kept up to a retention bound; the oldest
//! finished records are evicted first and active runs are never evicted.

use hoist_core::domain::log::LogEntry;
use hoist_core::domain::run::PipelineRun;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Records kept when no bound is configured
pub const DEFAULT_MAX_RUNS: usize = 100;

pub struct RunRecord {
    pub run: PipelineRun,
    pub logs: Vec<LogEntry>,
    pub cancel: CancellationToken,
}

/// Shared handle to all runs
#[derive(Clone)]
pub struct RunStore {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
    max_runs: usize,
}

impl RunStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_MAX_RUNS)
    }

    /// Keeps at most `max_runs` records once older runs have finished
    pub fn with_retention(max_runs: usize) -> Self {
        Self {
            records: Arc::default(),
            max_runs: max_runs.max(1),
        }
    }

    pub fn max_runs(&self) -> usize {
        self.max_runs
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, RunRecord>> {
        self.records.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, RunRecord>> {
        self.records.write().await
    }
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}
