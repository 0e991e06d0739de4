// ---------------------------------------------------------------------------
// handlers/ — HTTP surface
// Sub-modules for logical grouping; mod.rs re-exports all public items so
// that `crate::handlers::*` paths stay short in lib.rs routes.
// ---------------------------------------------------------------------------

pub(crate) mod analyze;
pub(crate) mod system;

pub use analyze::{analyze_run, analyze_stream, oracle_models};
pub use system::{health, readiness};

use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

// ---------------------------------------------------------------------------
// API error
// ---------------------------------------------------------------------------

/// Centralized API error type for all handlers. Logs full details
/// server-side, returns sanitized JSON to the client:
/// `{ "error": { "code": "...", "message": "..." } }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Sanitized message safe to return to clients.
    fn sanitized_message(&self) -> String {
        match self {
            ApiError::BadRequest(m) => m.clone(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        tracing::error!(
            code = self.error_code(),
            "API error ({}): {}",
            status.as_u16(),
            self
        );

        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.sanitized_message(),
            }
        });
        (status, Json(body)).into_response()
    }
}
