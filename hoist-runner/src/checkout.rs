//! Source snapshots
//!
//! A run builds from the exact commit that triggered it. Each run gets its
//! own detached git worktree in a private temporary directory, so concurrent
//! runs never share a working copy.

use anyhow::{Context, Result};
use hoist_core::domain::artifact::SourceSnapshot;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::process::{CommandExecutor, CommandSpec};

/// Prepares per-run worktrees from a local clone
pub struct GitCheckout {
    executor: Arc<dyn CommandExecutor>,
    repo: PathBuf,
    remote: Option<String>,
}

/// A worktree holding one commit
///
/// Call [`Checkout::release`] when the run is over; a dropped checkout only
/// deletes its files and leaves the worktree entry to the next prune.
#[derive(Debug)]
pub struct Checkout {
    snapshot: SourceSnapshot,
    _dir: TempDir,
}

impl Checkout {
    pub fn snapshot(&self) -> &SourceSnapshot {
        &self.snapshot
    }
}

impl GitCheckout {
    pub fn new(executor: Arc<dyn CommandExecutor>, repo: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            repo: repo.into(),
            remote: Some("origin".to_string()),
        }
    }

    /// Skips fetching; the commit must already be in the clone
    pub fn offline(mut self) -> Self {
        self.remote = None;
        self
    }

    fn git(&self) -> CommandSpec {
        CommandSpec::new("git")
            .arg("-C")
            .arg(self.repo.display().to_string())
    }

    async fn git_ok(&self, spec: CommandSpec) -> Result<String> {
        let display = spec.display();
        let output = self
            .executor
            .run(&spec)
            .await
            .with_context(|| format!("Failed to run '{}'", display))?;

        if !output.success() {
            anyhow::bail!("'{}' failed: {}", display, output.summary());
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Checks out `commit` into a fresh worktree
    pub async fn prepare(&self, commit: &str) -> Result<Checkout> {
        if commit.is_empty() || commit.starts_with('-') {
            anyhow::bail!("invalid commit '{}'", commit);
        }

        if let Some(ref remote) = self.remote {
            let fetch = self.git().args(["fetch", "--quiet", remote.as_str(), commit]);
            if let Err(e) = self.git_ok(fetch).await {
                // The commit may already be present locally
                warn!("Fetch of {} failed: {:#}", commit, e);
            }
        }

        if let Err(e) = self.git_ok(self.git().args(["worktree", "prune"])).await {
            debug!("Worktree prune failed: {:#}", e);
        }

        let dir = tempfile::Builder::new()
            .prefix("hoist-src-")
            .tempdir()
            .context("Failed to create worktree directory")?;
        let path = dir.path().join("src");

        self.git_ok(
            self.git()
                .args(["worktree", "add", "--detach"])
                .arg(path.display().to_string())
                .arg(commit),
        )
        .await
        .with_context(|| format!("Failed to check out {}", commit))?;

        info!("Checked out {} into {}", commit, path.display());

        Ok(Checkout {
            snapshot: SourceSnapshot::new(path, commit),
            _dir: dir,
        })
    }

    /// Removes the worktree and its files
    pub async fn release(&self, checkout: Checkout) {
        let path = checkout.snapshot.path.display().to_string();
        let remove = self.git().args(["worktree", "remove", "--force"]).arg(path);
        if let Err(e) = self.git_ok(remove).await {
            warn!("Failed to remove worktree: {:#}", e);
        }
    }
}

/// Resolves the commit checked out in `dir`
pub async fn resolve_head(executor: &dyn CommandExecutor, dir: &Path) -> Result<String> {
    let spec = CommandSpec::new("git")
        .arg("-C")
        .arg(dir.display().to_string())
        .args(["rev-parse", "HEAD"]);

    let output = executor
        .run(&spec)
        .await
        .context("Failed to execute git. Is it installed?")?;

    if !output.success() {
        anyhow::bail!("{} is not a git checkout: {}", dir.display(), output.summary());
    }

    Ok(output.stdout.trim().to_string())
}
