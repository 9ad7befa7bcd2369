use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::core::telephony::CallPlacementError;

/// Errors returned by the HTTP handlers.
///
/// Every variant renders as `{"error": "<message>"}` with a matching status code.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request failed validation (400)
    #[error("{0}")]
    BadRequest(String),

    /// A feature needs configuration that is missing (503)
    #[error("{0}")]
    NotConfigured(String),

    /// An upstream provider refused or failed the request (502)
    #[error("{0}")]
    Upstream(String),

    /// Anything else (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CallPlacementError> for AppError {
    fn from(err: CallPlacementError) -> Self {
        AppError::Upstream(format!("Failed to place call: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), "Request failed: {}", self);
        } else {
            warn!(status = status.as_u16(), "Request rejected: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotConfigured("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Upstream("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_call_placement_error_maps_to_bad_gateway() {
        let err: AppError = CallPlacementError::Rejected {
            status: 400,
            code: Some(21211),
            message: "Invalid 'To' Phone Number".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("Invalid 'To' Phone Number"));
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::BadRequest("bad number".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
