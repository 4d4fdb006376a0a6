//! # API Error Types
//!
//! [`AppError`] is the single HTTP error boundary. Every failure leaves the
//! service as a JSON body `{"error": message, "code": CODE}`. Fetch failures
//! expose their cause so players can show why a track is unavailable;
//! internal failures are logged and replaced with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use tunecache_fetch::FetchError;
use tunecache_store::StoreError;

use crate::streaming::StreamError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code (e.g. `NOT_FOUND`).
    pub code: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed request input (400).
    #[error("{0}")]
    BadRequest(String),

    /// Attempt to reach outside the artifact directory (403).
    #[error("{0}")]
    Forbidden(String),

    /// Unknown cache key or missing artifact (404).
    #[error("{0}")]
    NotFound(String),

    /// Resolution, download, or transcode failed (500, cause exposed).
    #[error("{0}")]
    Fetch(String),

    /// Anything else (500). Message is logged but not returned to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Fetch(_) => (StatusCode::INTERNAL_SERVER_ERROR, "FETCH_FAILED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::Fetch(_) => tracing::error!(error = %self, "download failed"),
            _ => {}
        }

        let body = ErrorBody {
            error: message,
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err.to_string())
    }
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Forbidden(_) => Self::Forbidden("Forbidden".to_string()),
            StreamError::NotFound(_) => Self::NotFound("Not Found".to_string()),
            StreamError::Io { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Forbidden(_) => Self::Forbidden("Forbidden".to_string()),
            StoreError::Artifact { .. } | StoreError::Persistence(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tunecache_core::CacheKey;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (AppError::Fetch("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "FETCH_FAILED"),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[tokio::test]
    async fn bad_request_body_carries_message() {
        let response = AppError::BadRequest("No URL provided".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "No URL provided");
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let response = AppError::Internal("disk on fire at /var/secret".into()).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "An internal error occurred");
        assert!(!body.to_string().contains("/var/secret"));
    }

    #[tokio::test]
    async fn fetch_error_exposes_cause() {
        let err: AppError = FetchError::Timeout {
            key: CacheKey::new("abc123").unwrap(),
            after: Duration::from_secs(600),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }

    #[test]
    fn stream_errors_map_to_client_statuses() {
        let forbidden: AppError = StreamError::Forbidden("../x".into()).into();
        assert!(matches!(forbidden, AppError::Forbidden(_)));
        let missing: AppError = StreamError::NotFound("a.mp3".into()).into();
        assert!(matches!(missing, AppError::NotFound(_)));
        let io: AppError = StreamError::Io {
            path: PathBuf::from("a.mp3"),
            source: std::io::Error::other("boom"),
        }
        .into();
        assert!(matches!(io, AppError::Internal(_)));
    }
}
