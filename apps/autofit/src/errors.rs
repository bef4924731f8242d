use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::session::SessionError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Content is empty")]
    EmptyContent,

    #[error("Handshake error: {0}")]
    Handshake(ProtocolError),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Protocol(e @ ProtocolError::HandshakeTimeout(_)) => AppError::Handshake(e),
            SessionError::Protocol(e) => AppError::Render(e.to_string()),
            SessionError::Render(msg) => AppError::Render(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::EmptyContent => (
                StatusCode::BAD_REQUEST,
                "EMPTY_CONTENT",
                "Markdown content is required".to_string(),
            ),
            AppError::Handshake(e) => {
                tracing::error!("Handshake error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "HANDSHAKE_FAILED",
                    "The render context did not become ready".to_string(),
                )
            }
            AppError::Render(msg) => {
                tracing::error!("Render error: {msg}");
                (StatusCode::BAD_GATEWAY, "RENDER_FAILED", msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::EmptyContent.into_response().status(), StatusCode::BAD_REQUEST);
        let handshake: AppError =
            SessionError::Protocol(ProtocolError::HandshakeTimeout(Duration::from_secs(5))).into();
        assert_eq!(handshake.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        let timeout: AppError =
            SessionError::Protocol(ProtocolError::RenderTimeout(Duration::from_secs(15))).into();
        assert_eq!(timeout.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    async fn failing_job() -> u32 {
        panic!("oracle thread died")
    }

    #[tokio::test]
    async fn test_panicked_job_maps_to_internal_error() {
        use anyhow::Context;

        let joined = tokio::spawn(failing_job()).await;
        let err: AppError = joined.context("render job task failed").unwrap_err().into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
