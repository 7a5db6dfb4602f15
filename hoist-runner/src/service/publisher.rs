//! Registry publisher
//!
//! Logs in to the registry with the injected credential, pushes the immutable
//! tag and then the alias, and logs out again. The token only ever reaches
//! the engine through stdin.

use async_trait::async_trait;
use hoist_core::domain::artifact::{BuildArtifact, ImageRef, PublishedArtifact};
use hoist_core::domain::credential::RegistryCredential;
use hoist_core::domain::log::LogLevel;
use hoist_core::error::PipelineError;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::process::{CommandExecutor, CommandSpec};

/// Service trait for pushing built artifacts
#[async_trait]
pub trait RegistryPublisher: Send + Sync {
    /// Pushes both tags of the artifact
    ///
    /// The immutable tag is pushed first, so the alias never points at an
    /// image the registry does not also hold under its commit tag.
    async fn publish(
        &self,
        artifact: &BuildArtifact,
        credential: &RegistryCredential,
        ctx: &RunContext,
    ) -> Result<PublishedArtifact, PipelineError>;
}

/// Registry replies that mean the credential itself was refused
const REJECTED_CREDENTIAL: [&str; 4] = [
    "unauthorized",
    "denied",
    "incorrect",
    "authentication required",
];

/// Tells a refused credential apart from an unreachable registry
fn credential_rejected(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    REJECTED_CREDENTIAL.iter().any(|marker| stderr.contains(marker))
}

/// Publishes through a docker compatible engine's `login` and `push`
pub struct DockerPublisher {
    executor: Arc<dyn CommandExecutor>,
    engine: String,
}

impl DockerPublisher {
    pub fn new(executor: Arc<dyn CommandExecutor>, engine: impl Into<String>) -> Self {
        Self {
            executor,
            engine: engine.into(),
        }
    }

    async fn login(
        &self,
        registry: Option<&str>,
        credential: &RegistryCredential,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        if credential.username.is_empty() || credential.token.is_empty() {
            return Err(PipelineError::Auth("registry credential is empty".to_string()));
        }

        let mut spec = CommandSpec::new(&self.engine).arg("login");
        if let Some(registry) = registry {
            spec = spec.arg(registry);
        }
        let spec = spec
            .arg("--username")
            .secret_arg(&credential.username)
            .arg("--password-stdin")
            .stdin(credential.token.clone());

        ctx.log_info(format!("$ {}", spec.display()));

        let output = self.executor.run(&spec).await.map_err(|e| PipelineError::Publish {
            reference: registry.unwrap_or("default registry").to_string(),
            message: format!("{:#}", e),
        })?;

        if !output.success() {
            if credential_rejected(&output.stderr) {
                return Err(PipelineError::Auth(output.summary()));
            }
            return Err(PipelineError::Publish {
                reference: registry.unwrap_or("default registry").to_string(),
                message: format!("login failed: {}", output.summary()),
            });
        }

        info!("Logged in to {}", registry.unwrap_or("default registry"));
        Ok(())
    }

    async fn push(&self, reference: &ImageRef, ctx: &RunContext) -> Result<(), PipelineError> {
        let spec = CommandSpec::new(&self.engine)
            .arg("push")
            .arg(reference.to_string());
        ctx.log_info(format!("$ {}", spec.display()));

        let publish_error = |message: String| PipelineError::Publish {
            reference: reference.to_string(),
            message,
        };

        let output = self
            .executor
            .run(&spec)
            .await
            .map_err(|e| publish_error(format!("{:#}", e)))?;

        ctx.log_output(LogLevel::Info, &output.stdout);

        if !output.success() {
            ctx.log_output(LogLevel::Error, &output.stderr);
            return Err(publish_error(output.summary()));
        }

        info!("Pushed {}", reference);
        Ok(())
    }

    /// Best effort; a failed logout never fails the run
    async fn logout(&self, registry: Option<&str>) {
        let mut spec = CommandSpec::new(&self.engine).arg("logout");
        if let Some(registry) = registry {
            spec = spec.arg(registry);
        }

        match self.executor.run(&spec).await {
            Ok(output) if output.success() => {}
            Ok(output) => warn!("Registry logout failed: {}", output.summary()),
            Err(e) => warn!("Registry logout failed: {:#}", e),
        }
    }
}

#[async_trait]
impl RegistryPublisher for DockerPublisher {
    async fn publish(
        &self,
        artifact: &BuildArtifact,
        credential: &RegistryCredential,
        ctx: &RunContext,
    ) -> Result<PublishedArtifact, PipelineError> {
        let [immutable, alias] = artifact.refs();
        let registry = immutable.registry().map(str::to_string);

        self.login(registry.as_deref(), credential, ctx).await?;

        let mut result = self.push(&immutable, ctx).await;
        if result.is_ok() {
            result = self.push(&alias, ctx).await;
        }

        self.logout(registry.as_deref()).await;
        result?;

        Ok(PublishedArtifact {
            image_id: artifact.image_id.clone(),
            immutable,
            alias,
        })
    }
}
