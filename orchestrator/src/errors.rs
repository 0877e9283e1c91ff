//! Error types for the Ark orchestrator

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openapi_server::models::ErrorResponse;
use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum ArkError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    FailedPrecondition(String),

    /// Upstream mesh or CI provider unreachable. Recoverable.
    #[error("{0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl ArkError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) | Self::FailedPrecondition(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::BAD_GATEWAY,
            Self::HttpError(e) if is_transient(e) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error is a transport-level failure worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::HttpError(e) => is_transient(e),
            _ => false,
        }
    }

    /// Whether the request never reached the upstream.
    ///
    /// Only these failures are safe to retry for non-idempotent calls.
    pub fn is_unsent(&self) -> bool {
        matches!(self, Self::HttpError(e) if e.is_connect())
    }

    /// Copy of this error for fan-out to several waiters.
    ///
    /// Taxonomy variants keep their kind; everything else collapses into
    /// `Unavailable` or `Internal` with the rendered message.
    pub fn to_shared(&self) -> Self {
        match self {
            Self::InvalidArgument(m) => Self::InvalidArgument(m.clone()),
            Self::NotFound(m) => Self::NotFound(m.clone()),
            Self::Conflict(m) => Self::Conflict(m.clone()),
            Self::FailedPrecondition(m) => Self::FailedPrecondition(m.clone()),
            Self::Unavailable(m) => Self::Unavailable(m.clone()),
            Self::Internal(m) => Self::Internal(m.clone()),
            other if other.is_transient() => Self::Unavailable(other.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request()
}

impl From<anyhow::Error> for ArkError {
    fn from(err: anyhow::Error) -> Self {
        ArkError::Internal(err.to_string())
    }
}

impl IntoResponse for ArkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            // Storage internals stay in the logs
            Self::IoError(_) => "internal storage error".to_string(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        }
        (status, Json(ErrorResponse { detail })).into_response()
    }
}
