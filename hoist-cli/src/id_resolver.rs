//! ID resolver module
//!
//! Resolves run id prefixes to full UUIDs by listing runs on the
//! orchestrator, so short unambiguous prefixes can be typed instead.

use anyhow::{Context, Result, anyhow};
use hoist_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a run ID or prefix to a full UUID
///
/// A full UUID is returned without contacting the orchestrator.
///
/// # Errors
/// Returns an error if no run or more than one run matches the prefix, or
/// if listing runs fails.
pub async fn resolve_run_id(client: &OrchestratorClient, id: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id.as_uuid() {
        return Ok(uuid);
    }

    let runs = client
        .list_runs()
        .await
        .context("Failed to fetch runs for ID resolution")?;

    match_prefix(runs.iter().map(|r| r.id), &id.to_string())
}

fn match_prefix(ids: impl Iterator<Item = Uuid>, prefix: &str) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.filter(|id| id.to_string().starts_with(prefix)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No run found with ID starting with '{}'", prefix)),
        [only] => Ok(*only),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple runs: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}
