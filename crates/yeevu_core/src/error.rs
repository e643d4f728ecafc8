//! Error types for the generation pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that end a generation session.
///
/// Tool failures never appear here; they are returned to the model as text.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] yeevu_sandbox::SandboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] yeevu_llm::LlmError),

    #[error("npm install failed after retry: {0}")]
    InstallFailed(String),

    #[error("Preview URL generation failed: {0}")]
    PreviewFailed(String),

    #[error("Session cancelled: client disconnected")]
    Cancelled,

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl From<zip::result::ZipError> for PipelineError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}
