//! Error types shared across the service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ---

/// Failure of one poll cycle. Never fatal; the next tick tries again.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("sensor fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("sensor returned no usable payload")]
    EmptyPayload,
    #[error("failed to persist reading: {0}")]
    Persist(#[source] sqlx::Error),
}

/// Request-time failure of a query handler.
///
/// The body shape differs per endpoint because the dashboard already parses
/// these exact responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 500 with `{"error": ...}`.
    #[error("{0}")]
    Json(&'static str),
    /// 500 with a plain-text body.
    #[error("{0}")]
    Text(&'static str),
    /// 404 with `{"message": ...}`.
    #[error("{0}")]
    NotFound(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        match self {
            ApiError::Json(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::Text(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": msg }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        // ---
        assert_eq!(
            ApiError::Json("x").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Text("x").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::NotFound("x").into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
