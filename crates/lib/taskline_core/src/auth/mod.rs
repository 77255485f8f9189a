//! Authentication and token lifecycle.
//!
//! Provides password hashing, JWT encoding/verification, the in-process
//! refresh-token registry and the [`service::TokenService`] that ties them
//! together. Shared by the HTTP layer and the websocket handshake.

pub mod duration;
pub mod jwt;
pub mod password;
pub mod refresh_store;
pub mod service;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential supplied, or not parseable as a bearer credential.
    #[error("Authentication required")]
    Unauthenticated,

    /// Signature, expiry or token-kind failure.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Valid credential, deactivated account.
    #[error("Principal is inactive")]
    PrincipalInactive,

    #[error("Invalid credentials")]
    CredentialError,

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
