//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use taskline_core::auth::AuthError;
use taskline_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database unavailable: {0}")]
    DbUnavailable(String),

    /// No credential supplied.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Credential supplied but invalid or expired; the client may refresh.
    #[error("Token invalid: {0}")]
    TokenInvalid(String),

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Principal is inactive")]
    PrincipalInactive,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::DbUnavailable(m) => {
                (StatusCode::SERVICE_UNAVAILABLE, "db_unavailable", m.as_str())
            }
            AppError::Unauthenticated(m) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", m.as_str())
            }
            AppError::TokenInvalid(m) => (StatusCode::UNAUTHORIZED, "token_invalid", m.as_str()),
            AppError::InvalidRefreshToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_refresh_token",
                "Invalid refresh token",
            ),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::PrincipalInactive => (
                StatusCode::FORBIDDEN,
                "principal_inactive",
                "Principal is inactive",
            ),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Internal(m) => {
                error!(error = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => AppError::DbUnavailable(msg),
            StoreError::Conflict(msg) => AppError::Validation(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated => {
                AppError::Unauthenticated("Authentication required".into())
            }
            AuthError::InvalidToken => AppError::TokenInvalid("Invalid or expired token".into()),
            AuthError::InvalidRefreshToken => AppError::InvalidRefreshToken,
            AuthError::PrincipalInactive => AppError::PrincipalInactive,
            AuthError::CredentialError => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::Store(e) => AppError::from(e),
            AuthError::TokenError(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_invalid_credentials_are_distinguishable() {
        let missing = AppError::from(AuthError::Unauthenticated).into_response();
        let invalid = AppError::from(AuthError::InvalidToken).into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert!(matches!(
            AppError::from(AuthError::Unauthenticated),
            AppError::Unauthenticated(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::InvalidToken),
            AppError::TokenInvalid(_)
        ));
    }

    #[test]
    fn store_errors_map_to_status() {
        let down = AppError::from(StoreError::Unavailable("pool".into())).into_response();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        let dup = AppError::from(StoreError::Conflict("email".into())).into_response();
        assert_eq!(dup.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn inactive_is_forbidden() {
        let resp = AppError::from(AuthError::PrincipalInactive).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
