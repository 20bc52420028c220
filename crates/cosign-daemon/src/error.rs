//! Error types for cosignd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cosign_engine::{ErrorKind, SigningError};
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Engine wiring error
    #[error("Signing engine error: {0}")]
    Signing(#[from] SigningError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Anything the signing engine refused
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        let kind = match self {
            ApiError::BadRequest(_) => return (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Signing(err) => err.kind(),
        };
        match kind {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::InvalidState => (StatusCode::CONFLICT, "INVALID_STATE"),
            ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            ErrorKind::MissingChannel => (StatusCode::BAD_REQUEST, "MISSING_CHANNEL"),
            ErrorKind::TokenExpired => (StatusCode::GONE, "TOKEN_EXPIRED"),
            ErrorKind::TokenAlreadyConsumed => (StatusCode::CONFLICT, "TOKEN_ALREADY_CONSUMED"),
            ErrorKind::NoActiveToken => (StatusCode::NOT_FOUND, "NO_ACTIVE_TOKEN"),
            ErrorKind::DeliveryFailed => (StatusCode::BAD_GATEWAY, "DELIVERY_FAILED"),
            ErrorKind::Config => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            ErrorKind::Storage => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cosign_storage::StorageError;
    use cosign_types::ParticipantId;

    fn status(err: SigningError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_api_error_status_codes() {
        let id = ParticipantId::generate();
        assert_eq!(status(SigningError::ParticipantNotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(SigningError::InvalidState("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status(SigningError::MissingChannel(id)), StatusCode::BAD_REQUEST);
        assert_eq!(status(SigningError::TokenExpired), StatusCode::GONE);
        assert_eq!(status(SigningError::TokenAlreadyConsumed), StatusCode::CONFLICT);
        assert_eq!(status(SigningError::NoActiveToken(id)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(SigningError::DeliveryFailed {
                participant_id: id,
                reason: "smtp down".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(SigningError::Storage(StorageError::Backend("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("x".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
