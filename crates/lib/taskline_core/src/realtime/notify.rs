//! Notification dispatcher: persist first, push live when the recipient is
//! connected. There is no redelivery of missed pushes; offline recipients
//! read their notifications back from storage.

use std::sync::Arc;

use tracing::{debug, info};

use super::events::ServerEvent;
use super::presence::PresenceRegistry;
use crate::models::auth::PrincipalId;
use crate::models::messaging::{NewNotification, Notification};
use crate::room::RoomId;
use crate::store::{Persistence, StoreResult};

/// Outcome of a bulk dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkOutcome {
    pub stored: usize,
    pub pushed: usize,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn Persistence>,
    presence: Arc<PresenceRegistry>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn Persistence>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// Store a notification for `principal_id` and push it if they are online.
    pub async fn notify(
        &self,
        principal_id: PrincipalId,
        notification: NewNotification,
    ) -> StoreResult<Notification> {
        let stored = self
            .store
            .create_notification(principal_id, notification)
            .await?;
        self.push(&stored).await;
        Ok(stored)
    }

    /// Store one notification per recipient in bulk, then push each
    /// individually to recipients that are online.
    pub async fn notify_many(
        &self,
        principal_ids: &[PrincipalId],
        notification: NewNotification,
    ) -> StoreResult<BulkOutcome> {
        if principal_ids.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let stored = self
            .store
            .create_notifications(principal_ids, notification)
            .await?;
        let mut pushed = 0;
        for n in &stored {
            if self.push(n).await {
                pushed += 1;
            }
        }
        info!(stored = stored.len(), pushed, "bulk notifications dispatched");
        Ok(BulkOutcome {
            stored: stored.len(),
            pushed,
        })
    }

    /// System notification to every active principal.
    pub async fn broadcast_system(
        &self,
        notification: NewNotification,
    ) -> StoreResult<BulkOutcome> {
        let recipients = self.store.list_active_principal_ids().await?;
        self.notify_many(&recipients, notification).await
    }

    async fn push(&self, notification: &Notification) -> bool {
        let room = RoomId::User(notification.principal_id);
        if !self.presence.is_online(notification.principal_id).await {
            debug!(
                principal_id = notification.principal_id,
                "recipient offline, notification left in storage"
            );
            return false;
        }
        let delivered = self
            .presence
            .broadcast(
                &room,
                ServerEvent::Notification {
                    notification: notification.clone(),
                },
            )
            .await;
        delivered > 0
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}
