//! Project tasks
//!
//! Runs the dependency installation and test commands in the source
//! snapshot. A nonzero exit from either fails the run at that gate.

use async_trait::async_trait;
use hoist_core::domain::artifact::SourceSnapshot;
use hoist_core::domain::log::LogLevel;
use hoist_core::domain::run::StepName;
use hoist_core::error::PipelineError;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::RunContext;
use crate::process::{CommandExecutor, CommandSpec};

/// Service trait for the pre-build gates
#[async_trait]
pub trait ProjectTasks: Send + Sync {
    /// Installs the project's dependencies
    async fn install(&self, snapshot: &SourceSnapshot, ctx: &RunContext) -> Result<(), PipelineError>;

    /// Runs the project's test suite
    async fn test(&self, snapshot: &SourceSnapshot, ctx: &RunContext) -> Result<(), PipelineError>;
}

/// Runs configured command lines in the snapshot directory
pub struct CommandTasks {
    executor: Arc<dyn CommandExecutor>,
    install: String,
    test: String,
}

impl CommandTasks {
    /// Creates tasks from two command lines, e.g. `npm ci` and `npm test`
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        install: impl Into<String>,
        test: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            install: install.into(),
            test: test.into(),
        }
    }

    async fn run_line(
        &self,
        step: StepName,
        line: &str,
        snapshot: &SourceSnapshot,
        ctx: &RunContext,
    ) -> Result<(), PipelineError> {
        let fail = |message: String| PipelineError::Build { step, message };

        let spec = CommandSpec::from_line(line)
            .ok_or_else(|| fail("no command configured".to_string()))?
            .cwd(&snapshot.path)
            .env("CI", "true");

        info!("Running {} step: {}", step, spec.display());
        ctx.log_info(format!("$ {}", spec.display()));

        let output = self
            .executor
            .run(&spec)
            .await
            .map_err(|e| fail(format!("{:#}", e)))?;

        ctx.log_output(LogLevel::Info, &output.stdout);
        ctx.log_output(LogLevel::Warning, &output.stderr);

        if !output.success() {
            return Err(fail(format!(
                "`{}` exited with code {}: {}",
                spec.display(),
                output.exit_code,
                output.summary()
            )));
        }

        debug!("{} step finished", step);
        Ok(())
    }
}

#[async_trait]
impl ProjectTasks for CommandTasks {
    async fn install(&self, snapshot: &SourceSnapshot, ctx: &RunContext) -> Result<(), PipelineError> {
        self.run_line(StepName::Install, &self.install, snapshot, ctx)
            .await
    }

    async fn test(&self, snapshot: &SourceSnapshot, ctx: &RunContext) -> Result<(), PipelineError> {
        self.run_line(StepName::Test, &self.test, snapshot, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;
    use hoist_core::error::FailureKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_install_runs_in_snapshot_dir() {
        let executor = Arc::new(ScriptedExecutor::new());
        let tasks = CommandTasks::new(executor.clone(), "npm ci", "npm test");
        let snapshot = SourceSnapshot::new("/work/app", "abc");
        let ctx = RunContext::new(Uuid::new_v4());

        tasks.install(&snapshot, &ctx).await.unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].display(), "npm ci");
        assert_eq!(calls[0].cwd.as_deref(), Some(std::path::Path::new("/work/app")));
    }

    #[tokio::test]
    async fn test_failing_tests_are_a_build_error_at_the_test_gate() {
        let executor = Arc::new(ScriptedExecutor::new().fail_on("npm test", 1, "1 failing"));
        let tasks = CommandTasks::new(executor, "npm ci", "npm test");
        let snapshot = SourceSnapshot::new(".", "abc");
        let ctx = RunContext::new(Uuid::new_v4());

        let err = tasks.test(&snapshot, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Build);
        assert!(matches!(err, PipelineError::Build { step: StepName::Test, .. }));
        assert!(err.to_string().contains("1 failing"));
    }

    #[tokio::test]
    async fn test_empty_command_fails() {
        let tasks = CommandTasks::new(Arc::new(ScriptedExecutor::new()), "  ", "npm test");
        let ctx = RunContext::new(Uuid::new_v4());
        let result = tasks.install(&SourceSnapshot::new(".", "abc"), &ctx).await;
        assert!(result.is_err());
    }
}
