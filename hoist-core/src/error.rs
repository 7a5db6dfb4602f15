//! Pipeline failure taxonomy
//!
//! Every error is fatal to the run that raised it. There are no retries and
//! no rollback; the error becomes the run's terminal failure reason.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::run::StepName;

/// Errors that terminate a pipeline run
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Dependency installation, tests or image packaging failed
    #[error("{step} step failed: {message}")]
    Build { step: StepName, message: String },

    /// Registry rejected the credential
    #[error("registry authentication failed: {0}")]
    Auth(String),

    /// Registry or network rejected a push
    #[error("failed to push {reference}: {message}")]
    Publish { reference: String, message: String },

    /// Remote session could not be established
    #[error("failed to open remote session: {0}")]
    Connect(String),

    /// A remote command exited nonzero
    #[error("remote command `{command}` exited with code {exit_code}: {stderr}")]
    RemoteCommand {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A step exceeded its time bound
    #[error("{step} step exceeded its {limit_secs}s limit")]
    Timeout { step: StepName, limit_secs: u64 },

    /// The run was cancelled before the given step started
    #[error("run cancelled before {0} step")]
    Cancelled(StepName),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Build { .. } => FailureKind::Build,
            PipelineError::Auth(_) => FailureKind::Auth,
            PipelineError::Publish { .. } => FailureKind::Publish,
            PipelineError::Connect(_) => FailureKind::Connect,
            PipelineError::RemoteCommand { .. } => FailureKind::RemoteCommand,
            PipelineError::Timeout { .. } => FailureKind::Timeout,
            PipelineError::Cancelled(_) => FailureKind::Cancelled,
        }
    }
}

/// Serializable error category recorded on a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Build,
    Auth,
    Publish,
    Connect,
    RemoteCommand,
    Timeout,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Build => "BuildError",
            FailureKind::Auth => "AuthError",
            FailureKind::Publish => "PublishError",
            FailureKind::Connect => "ConnectError",
            FailureKind::RemoteCommand => "RemoteCommandError",
            FailureKind::Timeout => "TimeoutError",
            FailureKind::Cancelled => "Cancelled",
        };
        write!(f, "{}", name)
    }
}
