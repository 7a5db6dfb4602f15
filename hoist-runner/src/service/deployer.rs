//! Remote deployer
//!
//! Replaces the running instance on the target over a single remote session:
//! pull the new image, stop and remove the previous container, start the new
//! one. An absent previous container is not an error, so redeploying the same
//! artifact converges on the same end state.

use async_trait::async_trait;
use hoist_core::domain::artifact::ImageRef;
use hoist_core::domain::target::{DeployTarget, InstanceSpec};
use hoist_core::error::PipelineError;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::probe::HttpProbe;
use crate::process::CommandOutput;
use crate::remote::{RemoteSession, RemoteShell};

/// Outcome of a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// A previous instance was running and has been stopped
    pub stopped_previous: bool,

    /// A previous instance existed and has been removed
    pub removed_previous: bool,

    /// Id printed by the engine for the new container
    pub container_id: String,
}

/// Service trait for replacing the running instance
#[async_trait]
pub trait RemoteDeployer: Send + Sync {
    async fn deploy(
        &self,
        target: &DeployTarget,
        image: &ImageRef,
        ctx: &RunContext,
    ) -> Result<DeployReport, PipelineError>;
}

/// Deploys by driving the container engine on the target
pub struct ContainerDeployer {
    shell: Arc<dyn RemoteShell>,
    engine: String,
    instance: InstanceSpec,
    probe: Option<HttpProbe>,
}

fn is_missing_container(output: &CommandOutput) -> bool {
    output
        .stderr
        .to_ascii_lowercase()
        .contains("no such container")
}

impl ContainerDeployer {
    pub fn new(shell: Arc<dyn RemoteShell>, engine: impl Into<String>, instance: InstanceSpec) -> Self {
        Self {
            shell,
            engine: engine.into(),
            instance,
            probe: None,
        }
    }

    /// Probes `http://<host>:<port>/` after the new instance starts
    pub fn with_probe(mut self, probe: HttpProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    fn command(&self, args: &[&str]) -> Vec<String> {
        std::iter::once(self.engine.as_str())
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    fn run_command(&self, image: &ImageRef) -> Vec<String> {
        let mapping = self.instance.port_mapping();
        let image = image.to_string();
        self.command(&["run", "-d", "--name", &self.instance.name, "-p", &mapping, &image])
    }

    /// Runs a command that must succeed
    async fn exec_required(
        &self,
        session: &mut dyn RemoteSession,
        argv: Vec<String>,
        ctx: &RunContext,
    ) -> Result<CommandOutput, PipelineError> {
        let command = argv.join(" ");
        ctx.log_info(format!("remote $ {}", command));

        let output = session
            .exec(&argv)
            .await
            .map_err(|e| PipelineError::RemoteCommand {
                command: command.clone(),
                exit_code: -1,
                stderr: format!("{:#}", e),
            })?;

        if !output.success() {
            return Err(PipelineError::RemoteCommand {
                command,
                exit_code: output.exit_code,
                stderr: output.summary(),
            });
        }

        Ok(output)
    }

    /// Runs a stop or remove; an absent container counts as done
    ///
    /// Returns whether the command acted on an existing container.
    async fn exec_tolerant(
        &self,
        session: &mut dyn RemoteSession,
        argv: Vec<String>,
        ctx: &RunContext,
    ) -> Result<bool, PipelineError> {
        let command = argv.join(" ");
        ctx.log_info(format!("remote $ {}", command));

        let output = session
            .exec(&argv)
            .await
            .map_err(|e| PipelineError::RemoteCommand {
                command: command.clone(),
                exit_code: -1,
                stderr: format!("{:#}", e),
            })?;

        if output.success() {
            return Ok(true);
        }

        if is_missing_container(&output) {
            ctx.log_info(format!("No previous instance named {}", self.instance.name));
            return Ok(false);
        }

        Err(PipelineError::RemoteCommand {
            command,
            exit_code: output.exit_code,
            stderr: output.summary(),
        })
    }

    async fn replace_instance(
        &self,
        session: &mut dyn RemoteSession,
        image: &ImageRef,
        ctx: &RunContext,
    ) -> Result<DeployReport, PipelineError> {
        let image_str = image.to_string();
        self.exec_required(session, self.command(&["pull", &image_str]), ctx)
            .await?;

        let name = self.instance.name.as_str();
        let stopped_previous = self
            .exec_tolerant(session, self.command(&["stop", name]), ctx)
            .await?;
        let removed_previous = self
            .exec_tolerant(session, self.command(&["rm", name]), ctx)
            .await?;

        let output = self
            .exec_required(session, self.run_command(image), ctx)
            .await?;

        Ok(DeployReport {
            stopped_previous,
            removed_previous,
            container_id: output.stdout.trim().to_string(),
        })
    }
}

#[async_trait]
impl RemoteDeployer for ContainerDeployer {
    async fn deploy(
        &self,
        target: &DeployTarget,
        image: &ImageRef,
        ctx: &RunContext,
    ) -> Result<DeployReport, PipelineError> {
        ctx.log_info("Opening remote session");
        let mut session = self
            .shell
            .connect(target)
            .await
            .map_err(|e| PipelineError::Connect(format!("{:#}", e)))?;

        let result = self.replace_instance(session.as_mut(), image, ctx).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close remote session: {:#}", e);
        }

        let report = result?;
        info!("Started container {} from {}", self.instance.name, image);
        ctx.log_info(format!(
            "Instance {} running {} on port {}",
            self.instance.name,
            image,
            self.instance.host_port
        ));

        if let Some(probe) = &self.probe {
            let url = format!("http://{}:{}/", target.host.expose(), self.instance.host_port);
            probe
                .check(&url)
                .await
                .map_err(|message| PipelineError::RemoteCommand {
                    command: format!("GET :{}/", self.instance.host_port),
                    exit_code: 1,
                    stderr: message,
                })?;
            ctx.log_info("Instance answered the health probe");
        }

        Ok(report)
    }
}
