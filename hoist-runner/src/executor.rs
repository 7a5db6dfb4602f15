//! Pipeline executor
//!
//! Drives one run through `Triggered → Installing → Testing → Building →
//! Publishing → Deploying → Succeeded`. The first failing step moves the run
//! to `Failed` and nothing after it runs. Each step is bounded by its own
//! timeout; cancellation is honoured only between steps.

use anyhow::Result;
use async_trait::async_trait;
use hoist_core::domain::artifact::SourceSnapshot;
use hoist_core::domain::run::{InvalidTransition, PipelineRun, RunState, StepName};
use hoist_core::error::PipelineError;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{PipelineSecrets, RunnerConfig, StepTimeouts};
use crate::context::RunContext;
use crate::probe::HttpProbe;
use crate::process::{CommandExecutor, LocalExecutor};
use crate::remote::SshShell;
use crate::service::{
    ArtifactBuilder, CommandTasks, ContainerDeployer, DeployReport, DockerBuilder,
    DockerPublisher, ProjectTasks, RegistryPublisher, RemoteDeployer,
};

/// Receives the run after every state change
#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn on_update(&self, run: &PipelineRun);
}

/// Observer that ignores updates
pub struct NoopObserver;

#[async_trait]
impl RunObserver for NoopObserver {
    async fn on_update(&self, _run: &PipelineRun) {}
}

/// The services backing each step
#[derive(Clone)]
pub struct Stages {
    pub tasks: Arc<dyn ProjectTasks>,
    pub builder: Arc<dyn ArtifactBuilder>,
    pub publisher: Arc<dyn RegistryPublisher>,
    pub deployer: Arc<dyn RemoteDeployer>,
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(DeployReport),
    Failed(PipelineError),
}

/// Why the step sequence stopped early
enum Halt {
    Step(PipelineError),
    Transition(InvalidTransition),
}

impl From<PipelineError> for Halt {
    fn from(err: PipelineError) -> Self {
        Halt::Step(err)
    }
}

impl From<InvalidTransition> for Halt {
    fn from(err: InvalidTransition) -> Self {
        Halt::Transition(err)
    }
}

/// Runs pipelines against a fixed set of stages
#[derive(Clone)]
pub struct PipelineExecutor {
    stages: Stages,
    timeouts: StepTimeouts,
}

impl PipelineExecutor {
    pub fn new(stages: Stages, timeouts: StepTimeouts) -> Self {
        Self { stages, timeouts }
    }

    /// Wires the local toolchain and ssh into the stages
    pub fn from_config(config: &RunnerConfig) -> Self {
        let executor: Arc<dyn CommandExecutor> = Arc::new(LocalExecutor::new());

        let mut deployer =
            ContainerDeployer::new(Arc::new(SshShell::new()), &config.engine, config.instance());
        if config.verify {
            deployer = deployer.with_probe(HttpProbe::new(config.expected_body.clone()));
        }

        let stages = Stages {
            tasks: Arc::new(CommandTasks::new(
                executor.clone(),
                &config.install_cmd,
                &config.test_cmd,
            )),
            builder: Arc::new(DockerBuilder::new(executor.clone(), config)),
            publisher: Arc::new(DockerPublisher::new(executor, &config.engine)),
            deployer: Arc::new(deployer),
        };

        Self::new(stages, config.timeouts.clone())
    }

    /// Executes a run to a terminal state
    ///
    /// Step failures are reported through [`RunOutcome::Failed`] and recorded
    /// on the run. An `Err` means the run was not in `Triggered`.
    pub async fn execute(
        &self,
        run: &mut PipelineRun,
        snapshot: &SourceSnapshot,
        secrets: &PipelineSecrets,
        ctx: &RunContext,
        observer: &dyn RunObserver,
    ) -> Result<RunOutcome> {
        if run.state != RunState::Triggered {
            anyhow::bail!("run {} is already {}", run.id, run.state);
        }

        info!(
            "Starting run {} for commit {} on {}",
            run.id, run.trigger.commit, run.trigger.branch
        );
        ctx.log_info(format!(
            "Pipeline triggered by push of {} to {}",
            run.trigger.commit, run.trigger.branch
        ));

        match self.run_steps(run, snapshot, secrets, ctx, observer).await {
            Ok(report) => {
                info!("Run {} succeeded", run.id);
                ctx.log_info(format!(
                    "Pipeline succeeded, {} is live",
                    run.image.as_deref().unwrap_or("image")
                ));
                Ok(RunOutcome::Succeeded(report))
            }
            Err(Halt::Step(err)) => {
                error!("Run {} failed: {}", run.id, err);
                ctx.log_error(err.to_string());
                run.fail_with(&err)?;
                observer.on_update(run).await;
                Ok(RunOutcome::Failed(err))
            }
            Err(Halt::Transition(err)) => Err(err.into()),
        }
    }

    async fn run_steps(
        &self,
        run: &mut PipelineRun,
        snapshot: &SourceSnapshot,
        secrets: &PipelineSecrets,
        ctx: &RunContext,
        observer: &dyn RunObserver,
    ) -> Result<DeployReport, Halt> {
        let stages = &self.stages;

        self.advance(run, observer).await?;
        self.step(StepName::Install, ctx, stages.tasks.install(snapshot, ctx))
            .await?;

        self.advance(run, observer).await?;
        self.step(StepName::Test, ctx, stages.tasks.test(snapshot, ctx))
            .await?;

        self.advance(run, observer).await?;
        let artifact = self
            .step(StepName::Build, ctx, stages.builder.build(snapshot, ctx))
            .await?;

        self.advance(run, observer).await?;
        let published = self
            .step(
                StepName::Publish,
                ctx,
                stages.publisher.publish(&artifact, &secrets.registry, ctx),
            )
            .await?;
        run.image = Some(published.immutable.to_string());

        self.advance(run, observer).await?;
        let report = self
            .step(
                StepName::Deploy,
                ctx,
                stages
                    .deployer
                    .deploy(&secrets.target, &published.immutable, ctx),
            )
            .await?;

        self.advance(run, observer).await?;
        Ok(report)
    }

    async fn advance(&self, run: &mut PipelineRun, observer: &dyn RunObserver) -> Result<(), Halt> {
        let state = run.advance()?;
        info!("Run {} is {}", run.id, state);
        observer.on_update(run).await;
        Ok(())
    }

    /// Runs one step under its timeout, unless the run was cancelled
    ///
    /// On timeout the step's future is dropped, which kills any child
    /// process it spawned.
    async fn step<T, F>(&self, step: StepName, ctx: &RunContext, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        if ctx.is_cancelled() {
            return Err(PipelineError::Cancelled(step));
        }

        ctx.log_info(format!("Starting {} step", step));
        let limit = self.timeouts.for_step(step);

        let value = tokio::time::timeout(limit, work)
            .await
            .map_err(|_| PipelineError::Timeout {
                step,
                limit_secs: limit.as_secs(),
            })??;

        ctx.log_info(format!("Finished {} step", step));
        Ok(value)
    }
}
