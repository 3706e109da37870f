//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`. Client responses carry a JSON `{"error": ...}`
//! body and never leak internal details.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use zentro_core::MissingIdentity;

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Application-level error type for the server.
#[derive(Debug, Error)]
pub enum AppError {
    /// Storage operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Payment gateway operation failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// No authenticated user and no session token on the request.
    #[error("missing identity")]
    MissingIdentity,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MissingIdentity> for AppError {
    fn from(_: MissingIdentity) -> Self {
        Self::MissingIdentity
    }
}

impl AppError {
    const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Internal(_)
                | Self::Store(
                    StoreError::Database(_)
                        | StoreError::DataCorruption(_)
                        | StoreError::InvariantViolation(_)
                        | StoreError::Serialization(_)
                )
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Store(err) => match err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::NoSelectedShipping => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::MissingIdentity | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(err) => match err {
                StoreError::NotFound => "not found".to_owned(),
                StoreError::Conflict(msg) => msg.clone(),
                StoreError::NoSelectedShipping => "no selected shipping address".to_owned(),
                _ => "internal server error".to_owned(),
            },
            Self::Gateway(_) => "payment gateway error".to_owned(),
            Self::MissingIdentity => "session_id is not provided".to_owned(),
            Self::Internal(_) => "internal server error".to_owned(),
            Self::NotFound(msg) | Self::BadRequest(msg) | Self::Unauthorized(msg) => msg.clone(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            status_of(AppError::Store(StoreError::NotFound)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(AppError::MissingIdentity), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AppError::Unauthorized("invalid token".to_owned())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AppError::Internal("boom".to_owned())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = AppError::Store(StoreError::DataCorruption("secret detail".to_owned()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
