//! Error types for the sandbox module.

use thiserror::Error;

/// Result type alias for sandbox operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors that can occur during sandbox operations.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox creation failed: {0}")]
    CreateFailed(String),

    #[error("Sandbox not found: {0}")]
    NotFound(String),

    #[error("Sandbox did not start within {0} seconds")]
    StartTimeout(u64),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    #[error("File transfer failed for {path}: {message}")]
    Transfer { path: String, message: String },

    #[error("Preview link unavailable for port {port}: {message}")]
    PreviewUnavailable { port: u16, message: String },

    #[error("Provider API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
