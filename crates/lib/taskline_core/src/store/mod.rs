//! Persistence collaborator.
//!
//! The real-time and token layers reach storage only through
//! [`Persistence`]. Lookups that can legitimately find nothing return
//! `Option`; `Err` always means the store itself failed, so callers can tell
//! "not a member" apart from "database unreachable".

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub(crate) mod slow;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{
    NewPrincipal, Principal, PrincipalCredentials, PrincipalId, PresenceUpdate,
};
use crate::models::messaging::{Message, NewMessage, NewNotification, Notification, TaskRef};
use crate::room::RoomId;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Filter for notification listing.
#[derive(Debug, Clone, Copy)]
pub struct NotificationQuery {
    pub unread_only: bool,
    pub limit: i64,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            unread_only: false,
            limit: 50,
        }
    }
}

/// Operations the core consumes from the persistence layer.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn find_principal_by_id(&self, id: PrincipalId) -> StoreResult<Option<Principal>>;

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<PrincipalCredentials>>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    ///
    /// The first principal a store ever holds is created as
    /// [`Role::Admin`](crate::models::auth::Role::Admin) whatever `new.role`
    /// says; the check and the insert are one atomic step.
    async fn create_principal(&self, new: NewPrincipal) -> StoreResult<Principal>;

    async fn update_principal_presence(
        &self,
        id: PrincipalId,
        update: PresenceUpdate,
    ) -> StoreResult<()>;

    /// Participant (conversation), owner/member/public visibility (project),
    /// or assignee/creator/watcher (task). A personal room admits only its owner.
    async fn is_room_member(&self, principal_id: PrincipalId, room: &RoomId) -> StoreResult<bool>;

    async fn list_room_participants(&self, room: &RoomId) -> StoreResult<Vec<PrincipalId>>;

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<TaskRef>>;

    async fn create_message(&self, new: NewMessage) -> StoreResult<Message>;

    async fn create_notification(
        &self,
        principal_id: PrincipalId,
        new: NewNotification,
    ) -> StoreResult<Notification>;

    /// Bulk variant used for system broadcasts.
    async fn create_notifications(
        &self,
        principal_ids: &[PrincipalId],
        new: NewNotification,
    ) -> StoreResult<Vec<Notification>>;

    async fn list_notifications(
        &self,
        principal_id: PrincipalId,
        query: NotificationQuery,
    ) -> StoreResult<Vec<Notification>>;

    async fn list_active_principal_ids(&self) -> StoreResult<Vec<PrincipalId>>;
}
