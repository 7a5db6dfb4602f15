//! Test doubles shared by the api and launcher tests

use async_trait::async_trait;
use hoist_core::domain::artifact::{BuildArtifact, ImageRef, PublishedArtifact, SourceSnapshot};
use hoist_core::domain::credential::RegistryCredential;
use hoist_core::domain::target::DeployTarget;
use hoist_core::error::PipelineError;
use hoist_runner::process::{CommandExecutor, CommandOutput, CommandSpec};
use hoist_runner::service::{
    ArtifactBuilder, DeployReport, ProjectTasks, RegistryPublisher, RemoteDeployer,
};
use hoist_runner::{PipelineSecrets, RunContext, Stages};
use std::sync::Arc;

/// Stages that succeed immediately
pub struct Instant;

#[async_trait]
impl ProjectTasks for Instant {
    async fn install(&self, _: &SourceSnapshot, ctx: &RunContext) -> Result<(), PipelineError> {
        ctx.log_info("added 57 packages");
        Ok(())
    }

    async fn test(&self, _: &SourceSnapshot, _: &RunContext) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[async_trait]
impl ArtifactBuilder for Instant {
    async fn build(
        &self,
        snapshot: &SourceSnapshot,
        _: &RunContext,
    ) -> Result<BuildArtifact, PipelineError> {
        Ok(BuildArtifact {
            image_id: "sha256:abc".to_string(),
            repository: "docker.io/dhaval/node-app".to_string(),
            immutable_tag: snapshot.commit.clone(),
            alias_tag: "latest".to_string(),
            platform: "linux/amd64".to_string(),
            created_at: chrono::Utc::now(),
        })
    }
}

#[async_trait]
impl RegistryPublisher for Instant {
    async fn publish(
        &self,
        artifact: &BuildArtifact,
        _: &RegistryCredential,
        _: &RunContext,
    ) -> Result<PublishedArtifact, PipelineError> {
        let [immutable, alias] = artifact.refs();
        Ok(PublishedArtifact {
            image_id: artifact.image_id.clone(),
            immutable,
            alias,
        })
    }
}

#[async_trait]
impl RemoteDeployer for Instant {
    async fn deploy(
        &self,
        _: &DeployTarget,
        _: &ImageRef,
        _: &RunContext,
    ) -> Result<DeployReport, PipelineError> {
        Ok(DeployReport {
            stopped_previous: false,
            removed_previous: false,
            container_id: "c0ffee".to_string(),
        })
    }
}

pub fn instant_stages() -> Stages {
    Stages {
        tasks: Arc::new(Instant),
        builder: Arc::new(Instant),
        publisher: Arc::new(Instant),
        deployer: Arc::new(Instant),
    }
}

pub fn secrets() -> PipelineSecrets {
    PipelineSecrets {
        registry: RegistryCredential::new("dhaval", "token"),
        target: DeployTarget::new("203.0.113.7", "ubuntu", "key"),
    }
}

/// Answers `git rev-parse HEAD` with a fixed commit
pub struct HeadAt(pub &'static str);

#[async_trait]
impl CommandExecutor for HeadAt {
    async fn run(&self, spec: &CommandSpec) -> anyhow::Result<CommandOutput> {
        if spec.program == "git" && spec.args.iter().any(|a| a == "rev-parse") {
            return Ok(CommandOutput {
                stdout: format!("{}\n", self.0),
                stderr: String::new(),
                exit_code: 0,
            });
        }
        anyhow::bail!("unexpected command: {}", spec.display())
    }
}
