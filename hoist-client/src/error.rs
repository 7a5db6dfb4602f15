//! Error types for the hoist client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned when talking to the orchestrator
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never got an HTTP answer
    #[error("request to orchestrator failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or wrong webhook secret
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The run is already in a terminal state
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other non-success status
    #[error("orchestrator answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// Maps a non-success status and its message to an error
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            _ => Self::Status { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Worth retrying: nothing answered, or the server failed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
