//! Error types for faceup-api
//!
//! Every handler error renders as `{"error": {"code", "message", ...}}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::ScanStatus;
use crate::services::{
    BillingError, DispatchError, ScanError, SignatureError, StorageError,
};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Scan result requested before completion (400)
    #[error("Scan not completed yet (status {status}, progress {progress})")]
    NotReady { status: ScanStatus, progress: u8 },

    /// Webhook signature rejected (400)
    #[error("Webhook signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// External provider failed (502)
    #[error("Upstream provider error: {0}")]
    Upstream(String),

    /// Store failure (500)
    #[error("Persistence error: {0}")]
    Persistence(#[from] faceup_common::Error),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        let (status, body) = match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, error_body("BAD_REQUEST", &message)),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, error_body("NOT_FOUND", &message)),
            ApiError::NotReady { status, progress } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": {
                        "code": "NOT_READY",
                        "message": message,
                        "status": status,
                        "progress": progress,
                    }
                }),
            ),
            ApiError::Signature(_) => (
                StatusCode::BAD_REQUEST,
                error_body("INVALID_SIGNATURE", &message),
            ),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, error_body("UPSTREAM_ERROR", &message)),
            ApiError::Persistence(ref err) => {
                tracing::error!(error = %err, "Persistence failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("PERSISTENCE_ERROR", &message),
                )
            }
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("INTERNAL_ERROR", &message),
            ),
        };

        (status, Json(body)).into_response()
    }
}

fn error_body(code: &str, message: &str) -> serde_json::Value {
    json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Validation(msg) => ApiError::Validation(msg),
            ScanError::NotFound(id) => ApiError::NotFound(format!("scan session {}", id)),
            ScanError::NotReady { status, progress } => ApiError::NotReady { status, progress },
            ScanError::Generation(e) => ApiError::Upstream(e.to_string()),
            ScanError::Persistence(e) => ApiError::Persistence(e),
            ScanError::Transition(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            // Handler failures after verification are reported as 500
            DispatchError::Persistence(e) => ApiError::Persistence(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_ready_carries_status_and_progress() {
        let (status, body) = render(ApiError::NotReady {
            status: ScanStatus::GeneratingSuggestions,
            progress: 50,
        })
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "NOT_READY");
        assert_eq!(body["error"]["status"], "generating_suggestions");
        assert_eq!(body["error"]["progress"], 50);
    }

    #[tokio::test]
    async fn test_status_codes() {
        assert_eq!(
            render(ApiError::NotFound("x".into())).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            render(ApiError::Signature(SignatureError::Mismatch)).await.0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            render(ApiError::Upstream("down".into())).await.0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            render(DispatchError::Payload("bad".into()).into()).await.0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
