//! Real-time layer: presence registry, event routing and notification push.
//!
//! Connections register with a [`presence::PresenceRegistry`] after the
//! handshake. Client events are parsed into [`events::ClientEvent`] and
//! dispatched by [`router::EventRouter`]. Notifications always go to storage
//! first and are pushed live by [`notify::NotificationDispatcher`] only when
//! the recipient is connected.

pub mod events;
pub mod notify;
pub mod presence;
pub mod router;

use thiserror::Error;

use crate::auth::AuthError;
use crate::room::RoomId;
use crate::store::StoreError;

/// Per-event failures. None of these close the connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid or expired credential")]
    InvalidOrExpiredCredential,

    #[error("Principal is inactive")]
    PrincipalInactive,

    #[error("Access denied to room {0}")]
    RoomAccessDenied(RoomId),

    #[error("Invalid event: {0}")]
    ValidationFailed(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl RealtimeError {
    /// Machine-readable code carried by `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidOrExpiredCredential => "token_invalid",
            Self::PrincipalInactive => "principal_inactive",
            Self::RoomAccessDenied(_) => "room_access_denied",
            Self::ValidationFailed(_) => "validation_failed",
            Self::PersistenceUnavailable(_) => "persistence_unavailable",
        }
    }

    /// Whether resending the same event may succeed.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}

impl From<StoreError> for RealtimeError {
    fn from(e: StoreError) -> Self {
        Self::PersistenceUnavailable(e.to_string())
    }
}

impl From<AuthError> for RealtimeError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::PrincipalInactive => Self::PrincipalInactive,
            AuthError::Store(e) => e.into(),
            _ => Self::InvalidOrExpiredCredential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_persistence_failures_are_retryable() {
        assert!(RealtimeError::PersistenceUnavailable("down".into()).retryable());
        assert!(!RealtimeError::RoomAccessDenied(RoomId::Project(7)).retryable());
        assert!(!RealtimeError::ValidationFailed("x".into()).retryable());
    }

    #[test]
    fn auth_errors_map_to_distinct_kinds() {
        assert_eq!(
            RealtimeError::from(AuthError::Unauthenticated),
            RealtimeError::Unauthenticated
        );
        assert_eq!(
            RealtimeError::from(AuthError::InvalidToken),
            RealtimeError::InvalidOrExpiredCredential
        );
        assert_eq!(
            RealtimeError::from(AuthError::PrincipalInactive).code(),
            "principal_inactive"
        );
    }
}
