//! Error types for dfd-an
//!
//! Every handler error maps to a JSON body `{"error": {"code", "message"}}`.

use crate::models::TransitionError;
use crate::services::{ExportError, RejectionReason};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Conflict (409) - run already active, or transition not allowed now
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input gate refused the file (415 / 413 / 400)
    #[error("{0}")]
    Rejected(#[from] RejectionReason),

    /// Report export failed
    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Rejected(ref reason) => {
                let status = match reason {
                    RejectionReason::UnsupportedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    RejectionReason::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    RejectionReason::Unreadable { .. } => StatusCode::BAD_REQUEST,
                };
                (status, reason.code(), reason.to_string())
            }
            ApiError::Export(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_ERROR", err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
