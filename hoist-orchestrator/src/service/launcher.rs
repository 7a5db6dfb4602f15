//! Run launcher
//!
//! Executes each run in its own task:
//! - Prepares the source snapshot for the pushed commit
//! - Drives the pipeline, storing every state change
//! - Flushes the run's buffered logs into the store periodically

use async_trait::async_trait;
use hoist_core::domain::artifact::SourceSnapshot;
use hoist_core::domain::run::{PipelineRun, StepName};
use hoist_core::error::PipelineError;
use hoist_runner::checkout::{Checkout, GitCheckout, resolve_head};
use hoist_runner::process::CommandExecutor;
use hoist_runner::{PipelineExecutor, PipelineSecrets, RunContext, RunObserver, RunOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::run_repository;
use crate::service::log_service;
use crate::store::RunStore;

/// Where a run's source comes from
pub enum SourceMode {
    /// Fresh worktree of the pushed commit
    Worktree(GitCheckout),

    /// A working copy used in place, one run at a time
    Directory(SharedDirectory),
}

/// Working copy shared by every run
///
/// A run only starts when the directory's HEAD is the pushed commit, and it
/// holds the directory until it reaches a terminal state.
pub struct SharedDirectory {
    dir: PathBuf,
    git: Arc<dyn CommandExecutor>,
    lock: Arc<Mutex<()>>,
}

impl SharedDirectory {
    pub fn new(git: Arc<dyn CommandExecutor>, dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            git,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Waits for the directory, then checks it holds `commit`
    async fn acquire(
        &self,
        commit: &str,
        ctx: &RunContext,
    ) -> Result<(SourceSnapshot, OwnedMutexGuard<()>), PipelineError> {
        let guard = match Arc::clone(&self.lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                ctx.log_info("Waiting for another run to release the source directory");
                Arc::clone(&self.lock).lock_owned().await
            }
        };

        let head = resolve_head(self.git.as_ref(), &self.dir)
            .await
            .map_err(|e| source_error(format!("cannot read HEAD: {:#}", e)))?;
        if !same_commit(&head, commit) {
            return Err(source_error(format!(
                "{} is at {} but {} was pushed",
                self.dir.display(),
                head,
                commit
            )));
        }

        ctx.log_info(format!("Using source directory {} at {}", self.dir.display(), head));
        Ok((SourceSnapshot::new(self.dir.clone(), commit), guard))
    }
}

/// Accepts an abbreviated pushed commit of at least 7 hex digits
fn same_commit(head: &str, pushed: &str) -> bool {
    let head = head.trim().to_ascii_lowercase();
    let pushed = pushed.trim().to_ascii_lowercase();
    pushed.len() >= 7 && head.starts_with(&pushed)
}

fn source_error(message: String) -> PipelineError {
    PipelineError::Build {
        step: StepName::Install,
        message,
    }
}

/// Source held by a run until it finishes
enum PreparedSource {
    Worktree(Checkout),
    Directory(SourceSnapshot, OwnedMutexGuard<()>),
}

impl PreparedSource {
    fn snapshot(&self) -> &SourceSnapshot {
        match self {
            PreparedSource::Worktree(checkout) => checkout.snapshot(),
            PreparedSource::Directory(snapshot, _) => snapshot,
        }
    }
}

/// Starts runs in the background
pub struct RunLauncher {
    executor: PipelineExecutor,
    source: SourceMode,
    secrets: PipelineSecrets,
    log_send_interval: Duration,
}

/// Writes every state change into the store
struct StoreObserver {
    store: RunStore,
}

#[async_trait]
impl RunObserver for StoreObserver {
    async fn on_update(&self, run: &PipelineRun) {
        if !run_repository::update(&self.store, run).await {
            warn!("Dropped update for run {} in state {}", run.id, run.state);
        }
    }
}

impl RunLauncher {
    pub fn new(
        executor: PipelineExecutor,
        source: SourceMode,
        secrets: PipelineSecrets,
        log_send_interval: Duration,
    ) -> Self {
        Self {
            executor,
            source,
            secrets,
            log_send_interval,
        }
    }

    /// Spawns a task executing `run`
    pub fn spawn(
        self: &Arc<Self>,
        store: RunStore,
        run: PipelineRun,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let launcher = Arc::clone(self);
        tokio::spawn(async move {
            let run_id = run.id;
            launcher.execute_run(store, run, cancel).await;
            debug!("Task for run {} finished", run_id);
        })
    }

    async fn execute_run(&self, store: RunStore, mut run: PipelineRun, cancel: CancellationToken) {
        let ctx = RunContext::with_cancellation(run.id, cancel);
        let log_sender = Self::spawn_log_sender(
            run.id,
            Arc::clone(&ctx),
            store.clone(),
            self.log_send_interval,
        );

        let observer = StoreObserver {
            store: store.clone(),
        };

        match self.prepare_source(&run, &ctx).await {
            Ok(source) => {
                match self
                    .executor
                    .execute(&mut run, source.snapshot(), &self.secrets, &ctx, &observer)
                    .await
                {
                    Ok(RunOutcome::Succeeded(report)) => {
                        info!("Run {} deployed container {}", run.id, report.container_id);
                    }
                    Ok(RunOutcome::Failed(err)) => {
                        info!("Run {} failed with {}", run.id, err.kind());
                    }
                    Err(e) => error!("Run {} could not be executed: {:#}", run.id, e),
                }

                // Dropping a directory guard lets the next run in
                if let (SourceMode::Worktree(git), PreparedSource::Worktree(checkout)) =
                    (&self.source, source)
                {
                    git.release(checkout).await;
                }
            }
            Err(err) => {
                ctx.log_error(err.to_string());
                if let Err(e) = run.fail_with(&err) {
                    error!("Run {} could not be failed: {}", run.id, e);
                }
                observer.on_update(&run).await;
            }
        }

        // Always abort log sender
        log_sender.abort();

        // Send remaining logs
        let remaining = ctx.drain_logs();
        if let Err(e) = log_service::add_log_entries(&store, run.id, remaining).await {
            warn!("Failed to store final logs for run {}: {:?}", run.id, e);
        }
    }

    async fn prepare_source(
        &self,
        run: &PipelineRun,
        ctx: &RunContext,
    ) -> Result<PreparedSource, PipelineError> {
        match &self.source {
            SourceMode::Directory(shared) => {
                let (snapshot, guard) = shared.acquire(&run.trigger.commit, ctx).await?;
                Ok(PreparedSource::Directory(snapshot, guard))
            }
            SourceMode::Worktree(git) => {
                ctx.log_info(format!("Checking out {}", run.trigger.commit));
                let checkout = git
                    .prepare(&run.trigger.commit)
                    .await
                    .map_err(|e| source_error(format!("checkout failed: {:#}", e)))?;
                Ok(PreparedSource::Worktree(checkout))
            }
        }
    }

    /// Periodically moves buffered run logs into the store
    fn spawn_log_sender(
        run_id: Uuid,
        ctx: Arc<RunContext>,
        store: RunStore,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);

            loop {
                ticker.tick().await;

                let logs = ctx.drain_logs();

                if logs.is_empty() {
                    continue;
                }

                debug!("Storing {} logs for run {}", logs.len(), run_id);

                if let Err(e) = log_service::add_log_entries(&store, run_id, logs).await {
                    error!("Failed to store logs for run {}: {:?}", run_id, e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::domain::run::{RunState, Trigger};
    use hoist_core::error::FailureKind;
    use hoist_runner::process::{CommandOutput, CommandSpec};
    use hoist_runner::service::ProjectTasks;
    use hoist_runner::{Stages, StepTimeouts};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::testing::{HeadAt, instant_stages, secrets};

    const HEAD: &str = "9f1c2d3e8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d";

    /// Install that takes a while and records how many ran at once
    #[derive(Default)]
    struct SlowInstall {
        installs: AtomicUsize,
        in_flight: AtomicUsize,
        most_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl ProjectTasks for SlowInstall {
        async fn install(&self, _: &SourceSnapshot, _: &RunContext) -> Result<(), PipelineError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.most_in_flight.fetch_max(now, Ordering::SeqCst);
            time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        async fn test(&self, _: &SourceSnapshot, _: &RunContext) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn directory_launcher(tasks: Arc<SlowInstall>) -> Arc<RunLauncher> {
        let stages = Stages {
            tasks,
            ..instant_stages()
        };
        Arc::new(RunLauncher::new(
            PipelineExecutor::new(stages, StepTimeouts::default()),
            SourceMode::Directory(SharedDirectory::new(Arc::new(HeadAt(HEAD)), ".")),
            secrets(),
            Duration::from_millis(10),
        ))
    }

    async fn launch(launcher: &Arc<RunLauncher>, store: &RunStore, commit: &str) -> Uuid {
        let run = PipelineRun::new(Trigger::push(commit, "main"));
        let id = run.id;
        let token = run_repository::create(store, &run).await;
        launcher.spawn(store.clone(), run, token).await.unwrap();
        id
    }

    #[test]
    fn test_same_commit_accepts_abbreviations() {
        assert!(same_commit(HEAD, HEAD));
        assert!(same_commit(&format!("{}\n", HEAD), "9F1C2D3"));
        assert!(!same_commit(HEAD, "9f1c2d"));
        assert!(!same_commit(HEAD, "0123abcd"));
    }

    #[tokio::test]
    async fn test_directory_at_other_commit_fails_run() {
        let tasks = Arc::new(SlowInstall::default());
        let launcher = directory_launcher(Arc::clone(&tasks));
        let store = RunStore::new();

        let id = launch(&launcher, &store, "0123abcd").await;

        let run = run_repository::find_by_id(&store, id).await.unwrap();
        assert_eq!(run.state, RunState::Failed);
        let failure = run.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Build);
        assert!(failure.message.contains("0123abcd was pushed"));
        assert_eq!(tasks.installs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_directory_runs_take_turns() {
        let tasks = Arc::new(SlowInstall::default());
        let launcher = directory_launcher(Arc::clone(&tasks));
        let store = RunStore::new();

        let (first, second) = tokio::join!(
            launch(&launcher, &store, HEAD),
            launch(&launcher, &store, "9f1c2d3"),
        );

        for id in [first, second] {
            let run = run_repository::find_by_id(&store, id).await.unwrap();
            assert_eq!(run.state, RunState::Succeeded);
        }
        assert_eq!(tasks.installs.load(Ordering::SeqCst), 2);
        assert_eq!(tasks.most_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreadable_head_fails_run() {
        struct NotARepo;

        #[async_trait]
        impl CommandExecutor for NotARepo {
            async fn run(&self, _: &CommandSpec) -> anyhow::Result<CommandOutput> {
                Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: "fatal: not a git repository".to_string(),
                    exit_code: 128,
                })
            }
        }

        let launcher = Arc::new(RunLauncher::new(
            PipelineExecutor::new(instant_stages(), StepTimeouts::default()),
            SourceMode::Directory(SharedDirectory::new(Arc::new(NotARepo), ".")),
            secrets(),
            Duration::from_millis(10),
        ));
        let store = RunStore::new();

        let id = launch(&launcher, &store, HEAD).await;

        let run = run_repository::find_by_id(&store, id).await.unwrap();
        assert_eq!(run.failure.unwrap().kind, FailureKind::Build);
    }
}
