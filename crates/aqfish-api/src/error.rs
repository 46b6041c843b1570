use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::envelope::Envelope;

/// The error-kind taxonomy of §7, mapped to the envelope + HTTP status pair
/// every handler surfaces on failure.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("permission denied")]
    PermissionDenied,
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{0}")]
    Conflict(String),
    #[error("no capacity available")]
    CapacityExhausted,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let envelope = Envelope { status: false, message: self.to_string(), data: serde_json::Value::Null };
        (status, axum::Json(envelope)).into_response()
    }
}

impl From<aqfish_store::StoreError> for ApiError {
    fn from(e: aqfish_store::StoreError) -> Self {
        match e {
            aqfish_store::StoreError::NotFound { kind, uid } => ApiError::NotFound { kind, id: uid },
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<aqfish_core::CoreError> for ApiError {
    fn from(e: aqfish_core::CoreError) -> Self {
        match e {
            aqfish_core::CoreError::Capacity(c) => {
                tracing::debug!(error = %c, "capacity exhausted");
                ApiError::CapacityExhausted
            }
            aqfish_core::CoreError::Store(s) => s.into(),
            aqfish_core::CoreError::InvalidStateTransition { from, to } => {
                ApiError::Conflict(format!("illegal state transition: {from} -> {to}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<crate::filter::FilterParseError> for ApiError {
    fn from(e: crate::filter::FilterParseError) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}
