//! Error types for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use yeevu_sandbox::SandboxError;

/// Result type alias for handlers.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned before a response body starts streaming.
///
/// Every variant renders as a JSON object with an `error` field.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Config(String),

    #[error("Daily generation limit reached")]
    QuotaExceeded { reset_at: DateTime<Utc> },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Sandbox(SandboxError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::QuotaExceeded { reset_at } => json!({
                "error": self.to_string(),
                "resetTime": reset_at,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
