//! Error types for sandbox acquisition and git operations

use thiserror::Error;

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors raised by providers, the coordinator, and the git protocol
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox provider error: {0}")]
    Provider(String),

    #[error("Sandbox '{0}' not found")]
    NotFound(String),

    #[error("Sandbox creation failed after {attempts} attempts: {last_error}")]
    CreationFailed { attempts: usize, last_error: String },

    #[error("Git {operation} failed in sandbox '{sandbox_id}': {detail}")]
    Git {
        operation: String,
        sandbox_id: String,
        detail: String,
    },

    #[error("Command exited with status {exit_code}: {stderr}")]
    CommandFailed { exit_code: i64, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn git(
        operation: impl Into<String>,
        sandbox_id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Git {
            operation: operation.into(),
            sandbox_id: sandbox_id.into(),
            detail: detail.into(),
        }
    }
}
