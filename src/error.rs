//! Error types for the application

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable error codes handed to clients for display or localization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    AuthorizationError,
    InvalidStateError,
    NotFoundError,
    TransportError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::AuthorizationError => "authorization_error",
            ErrorKind::InvalidStateError => "invalid_state_error",
            ErrorKind::NotFoundError => "not_found_error",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::ValidationError,
            AppError::Authorization(_) => ErrorKind::AuthorizationError,
            AppError::InvalidState(_) => ErrorKind::InvalidStateError,
            AppError::NotFound(_) => ErrorKind::NotFoundError,
            AppError::Transport(_) => ErrorKind::TransportError,
            AppError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Message suitable for showing to the person who triggered the operation.
    ///
    /// Validation messages are specific to the input and are passed through;
    /// everything else collapses to a fixed sentence.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Authorization(_) => {
                "You do not have permission to perform this action".to_string()
            }
            AppError::InvalidState(_) => "This request has already been resolved".to_string(),
            AppError::NotFound(_) => "This request is no longer available".to_string(),
            AppError::Transport(_) => "Something went wrong, please try again".to_string(),
            AppError::Internal(_) => "Something went wrong".to_string(),
        }
    }

    /// Whether the client copy of the data is stale and should be re-queried
    pub fn should_refetch(&self) -> bool {
        matches!(self, AppError::InvalidState(_) | AppError::NotFound(_))
    }

    /// Whether an idempotent read may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Authorization(e) => {
                tracing::warn!("Authorization error: {}", e);
                StatusCode::FORBIDDEN
            }
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Transport(e) => {
                tracing::error!("Transport error: {}", e);
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.user_message()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("request".to_string());
        assert_eq!(format!("{}", err), "Not found: request");

        let err = AppError::Validation("bad amount".to_string());
        assert_eq!(format!("{}", err), "Validation error: bad amount");

        let err = AppError::Authorization("not the receiver".to_string());
        assert_eq!(format!("{}", err), "Not authorized: not the receiver");

        let err = AppError::InvalidState("already accepted".to_string());
        assert_eq!(format!("{}", err), "Invalid state: already accepted");
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(
            AppError::Validation(String::new()).kind().as_str(),
            "validation_error"
        );
        assert_eq!(
            AppError::Authorization(String::new()).kind().as_str(),
            "authorization_error"
        );
        assert_eq!(
            AppError::InvalidState(String::new()).kind().as_str(),
            "invalid_state_error"
        );
        assert_eq!(
            AppError::NotFound(String::new()).kind().as_str(),
            "not_found_error"
        );
        let sqlx_err = sqlx::Error::Configuration("test".into());
        assert_eq!(AppError::from(sqlx_err).kind().as_str(), "transport_error");
    }

    #[test]
    fn test_refetch_and_retry_flags() {
        assert!(AppError::InvalidState("x".into()).should_refetch());
        assert!(AppError::NotFound("x".into()).should_refetch());
        assert!(!AppError::Validation("x".into()).should_refetch());
        assert!(!AppError::Authorization("x".into()).should_refetch());

        let transport: AppError = sqlx::Error::PoolTimedOut.into();
        assert!(transport.is_retryable());
        assert!(!AppError::InvalidState("x".into()).is_retryable());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            AppError::InvalidState("x".into()).user_message(),
            "This request has already been resolved"
        );
        assert_eq!(
            AppError::NotFound("x".into()).user_message(),
            "This request is no longer available"
        );
        assert_eq!(
            AppError::Validation("Amount must be a multiple of 50".into()).user_message(),
            "Amount must be a multiple of 50"
        );
    }

    #[test]
    fn test_into_response_statuses() {
        let cases = [
            (AppError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (AppError::Authorization("a".into()), StatusCode::FORBIDDEN),
            (AppError::InvalidState("s".into()), StatusCode::CONFLICT),
            (AppError::NotFound("n".into()), StatusCode::NOT_FOUND),
            (
                AppError::Transport(sqlx::Error::PoolTimedOut),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Internal("i".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn test_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(test_fn().unwrap(), 42);

        fn test_err_fn() -> Result<i32> {
            Err(AppError::NotFound("test".to_string()))
        }
        assert!(test_err_fn().is_err());
    }
}
