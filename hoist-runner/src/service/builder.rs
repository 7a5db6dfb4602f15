//! Artifact builder
//!
//! Builds one container image from a source snapshot and tags it twice: the
//! immutable commit tag and the moving `latest` alias. Both tags must resolve
//! to the same image id before the artifact is handed on.

use async_trait::async_trait;
use chrono::Utc;
use hoist_core::domain::artifact::{BuildArtifact, ImageRef, LATEST_TAG, SourceSnapshot};
use hoist_core::domain::log::LogLevel;
use hoist_core::domain::run::StepName;
use hoist_core::error::PipelineError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::dockerfile::{DockerfileTemplate, installs_before_source_copy, render_ignore};
use crate::process::{CommandExecutor, CommandSpec};

/// Service trait for image builds
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    /// Builds and tags an image for the snapshot
    async fn build(
        &self,
        snapshot: &SourceSnapshot,
        ctx: &RunContext,
    ) -> Result<BuildArtifact, PipelineError>;
}

/// Builds images with a docker compatible engine
pub struct DockerBuilder {
    executor: Arc<dyn CommandExecutor>,
    engine: String,
    repository: String,
    platform: String,
    port: u16,
    template: DockerfileTemplate,
}

/// Generated Dockerfile and its ignore file, removed on drop
struct GeneratedDockerfile {
    dir: TempDir,
}

impl GeneratedDockerfile {
    fn path(&self) -> PathBuf {
        self.dir.path().join("Dockerfile")
    }
}

fn build_error(message: impl Into<String>) -> PipelineError {
    PipelineError::Build {
        step: StepName::Build,
        message: message.into(),
    }
}

impl DockerBuilder {
    pub fn new(executor: Arc<dyn CommandExecutor>, config: &RunnerConfig) -> Self {
        Self {
            executor,
            engine: config.engine.clone(),
            repository: config.image.clone(),
            platform: config.platform.clone(),
            port: config.port,
            template: DockerfileTemplate::node(config.port),
        }
    }

    fn build_spec(
        &self,
        snapshot: &SourceSnapshot,
        immutable: &ImageRef,
        alias: &ImageRef,
        dockerfile: Option<&Path>,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.engine)
            .arg("build")
            .args(["--platform", self.platform.as_str()])
            .arg("--build-arg")
            .arg(format!("PORT={}", self.port))
            .arg("--label")
            .arg(format!("org.opencontainers.image.revision={}", snapshot.commit))
            .args(["-t".to_string(), immutable.to_string()])
            .args(["-t".to_string(), alias.to_string()]);

        if let Some(path) = dockerfile {
            spec = spec.arg("-f").arg(path.display().to_string());
        }

        spec.arg(snapshot.path.display().to_string())
    }

    /// Resolves a tag to the local image id
    async fn inspect_id(&self, reference: &ImageRef) -> Result<String, PipelineError> {
        let spec = CommandSpec::new(&self.engine)
            .args(["image", "inspect", "--format", "{{.Id}}"])
            .arg(reference.to_string());

        let output = self
            .executor
            .run(&spec)
            .await
            .map_err(|e| build_error(format!("{:#}", e)))?;

        let id = output.stdout.trim();
        if !output.success() || id.is_empty() {
            return Err(build_error(format!(
                "tag {} not found after build: {}",
                reference,
                output.summary()
            )));
        }

        Ok(id.to_string())
    }

    /// Renders the default Dockerfile when the snapshot has none
    async fn prepare_dockerfile(
        &self,
        snapshot: &SourceSnapshot,
        ctx: &RunContext,
    ) -> Result<Option<GeneratedDockerfile>, PipelineError> {
        let existing = snapshot.path.join("Dockerfile");

        if existing.is_file() {
            let contents = tokio::fs::read_to_string(&existing)
                .await
                .map_err(|e| build_error(format!("failed to read Dockerfile: {}", e)))?;

            if !installs_before_source_copy(&contents) {
                warn!("Dockerfile copies sources before installing dependencies");
                ctx.log_warning(
                    "Dockerfile copies the full source before installing dependencies; \
                     the dependency layer is rebuilt on every change",
                );
            }
            return Ok(None);
        }

        ctx.log_info("No Dockerfile in source, using the generated two-stage Dockerfile");

        let source_ignore = match tokio::fs::read_to_string(snapshot.path.join(".dockerignore")).await
        {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(build_error(format!("failed to read .dockerignore: {}", e))),
        };

        let dir = tempfile::Builder::new()
            .prefix("hoist-dockerfile-")
            .tempdir()
            .map_err(|e| build_error(format!("failed to create Dockerfile: {}", e)))?;
        let generated = GeneratedDockerfile { dir };

        // BuildKit reads <Dockerfile>.dockerignore instead of the context's
        tokio::fs::write(generated.path(), self.template.render())
            .await
            .map_err(|e| build_error(format!("failed to write Dockerfile: {}", e)))?;
        tokio::fs::write(
            generated.dir.path().join("Dockerfile.dockerignore"),
            render_ignore(source_ignore.as_deref()),
        )
        .await
        .map_err(|e| build_error(format!("failed to write Dockerfile.dockerignore: {}", e)))?;

        Ok(Some(generated))
    }
}

#[async_trait]
impl ArtifactBuilder for DockerBuilder {
    async fn build(
        &self,
        snapshot: &SourceSnapshot,
        ctx: &RunContext,
    ) -> Result<BuildArtifact, PipelineError> {
        let tag = snapshot.immutable_tag().ok_or_else(|| {
            build_error(format!(
                "commit '{}' cannot be used as an image tag",
                snapshot.commit
            ))
        })?;

        let immutable = ImageRef::new(&self.repository, &tag);
        let alias = immutable.with_tag(LATEST_TAG);

        // Kept alive until the build command has read it
        let generated = self.prepare_dockerfile(snapshot, ctx).await?;

        let dockerfile = generated.as_ref().map(GeneratedDockerfile::path);
        let spec = self.build_spec(snapshot, &immutable, &alias, dockerfile.as_deref());
        info!("Building image {}", immutable);
        ctx.log_info(format!("$ {}", spec.display()));

        let output = self
            .executor
            .run(&spec)
            .await
            .map_err(|e| build_error(format!("{:#}", e)))?;

        ctx.log_output(LogLevel::Info, &output.stdout);
        // BuildKit reports progress on stderr
        ctx.log_output(LogLevel::Debug, &output.stderr);

        if !output.success() {
            return Err(build_error(format!(
                "image build exited with code {}: {}",
                output.exit_code,
                output.summary()
            )));
        }

        let immutable_id = self.inspect_id(&immutable).await?;
        let alias_id = self.inspect_id(&alias).await?;
        if immutable_id != alias_id {
            return Err(build_error(format!(
                "{} and {} resolve to different images",
                immutable, alias
            )));
        }

        ctx.log_info(format!("Built {} ({})", immutable, immutable_id));

        Ok(BuildArtifact {
            image_id: immutable_id,
            repository: self.repository.clone(),
            immutable_tag: tag,
            alias_tag: LATEST_TAG.to_string(),
            platform: self.platform.clone(),
            created_at: Utc::now(),
        })
    }
}
