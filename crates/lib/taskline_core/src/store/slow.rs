//! Test wrapper that delays selected [`Persistence`] calls, for exercising
//! interleavings between concurrent callers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::memory::InMemoryStore;
use super::{NotificationQuery, Persistence, StoreResult};
use crate::models::auth::{
    NewPrincipal, Principal, PrincipalCredentials, PrincipalId, PresenceUpdate,
};
use crate::models::messaging::{Message, NewMessage, NewNotification, Notification, TaskRef};
use crate::room::RoomId;

#[derive(Debug)]
pub(crate) struct SlowStore {
    inner: Arc<InMemoryStore>,
    lookup_delay: Duration,
    offline_write_delay: Duration,
}

impl SlowStore {
    pub(crate) fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            lookup_delay: Duration::ZERO,
            offline_write_delay: Duration::ZERO,
        }
    }

    /// Delay `find_principal_by_id`.
    pub(crate) fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = delay;
        self
    }

    /// Delay presence writes that mark a principal offline.
    pub(crate) fn with_offline_write_delay(mut self, delay: Duration) -> Self {
        self.offline_write_delay = delay;
        self
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Persistence for SlowStore {
    async fn find_principal_by_id(&self, id: PrincipalId) -> StoreResult<Option<Principal>> {
        pause(self.lookup_delay).await;
        self.inner.find_principal_by_id(id).await
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<PrincipalCredentials>> {
        self.inner.find_credentials_by_email(email).await
    }

    async fn create_principal(&self, new: NewPrincipal) -> StoreResult<Principal> {
        self.inner.create_principal(new).await
    }

    async fn update_principal_presence(
        &self,
        id: PrincipalId,
        update: PresenceUpdate,
    ) -> StoreResult<()> {
        if !update.online {
            pause(self.offline_write_delay).await;
        }
        self.inner.update_principal_presence(id, update).await
    }

    async fn is_room_member(&self, principal_id: PrincipalId, room: &RoomId) -> StoreResult<bool> {
        self.inner.is_room_member(principal_id, room).await
    }

    async fn list_room_participants(&self, room: &RoomId) -> StoreResult<Vec<PrincipalId>> {
        self.inner.list_room_participants(room).await
    }

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<TaskRef>> {
        self.inner.find_task(task_id).await
    }

    async fn create_message(&self, new: NewMessage) -> StoreResult<Message> {
        self.inner.create_message(new).await
    }

    async fn create_notification(
        &self,
        principal_id: PrincipalId,
        new: NewNotification,
    ) -> StoreResult<Notification> {
        self.inner.create_notification(principal_id, new).await
    }

    async fn create_notifications(
        &self,
        principal_ids: &[PrincipalId],
        new: NewNotification,
    ) -> StoreResult<Vec<Notification>> {
        self.inner.create_notifications(principal_ids, new).await
    }

    async fn list_notifications(
        &self,
        principal_id: PrincipalId,
        query: NotificationQuery,
    ) -> StoreResult<Vec<Notification>> {
        self.inner.list_notifications(principal_id, query).await
    }

    async fn list_active_principal_ids(&self) -> StoreResult<Vec<PrincipalId>> {
        self.inner.list_active_principal_ids().await
    }
}
