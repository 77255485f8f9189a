//! Event router: applies client events for an authenticated connection.
//!
//! Each connection's events are handled one at a time by its socket task, so
//! a membership check and the broadcast that follows it never interleave with
//! another event from the same connection. Failures are reported only to the
//! originating connection as `error` events; the connection stays open.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::RealtimeError;
use super::events::{ClientEvent, PresenceStatus, ServerEvent};
use super::notify::NotificationDispatcher;
use super::presence::{ConnectionId, EventSender, PresenceRegistry};
use crate::models::auth::{PresenceUpdate, Principal, PrincipalId};
use crate::models::messaging::{Message, MessageType, NewMessage, NewNotification, NotificationKind};
use crate::room::RoomId;
use crate::store::{Persistence, StoreResult};

/// Default bound on a single collaborator call made by the router.
pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Characters of message content copied into a notification.
const PREVIEW_CHARS: usize = 100;

/// An authenticated, registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub principal_id: PrincipalId,
}

pub struct EventRouter {
    store: Arc<dyn Persistence>,
    presence: Arc<PresenceRegistry>,
    notifier: NotificationDispatcher,
    persistence_timeout: Duration,
    /// Per-principal lock held across a connect or disconnect, so the
    /// presence write and announcement of one cannot land after the other's.
    transitions: DashMap<PrincipalId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("persistence_timeout", &self.persistence_timeout)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn Persistence>,
        presence: Arc<PresenceRegistry>,
        persistence_timeout: Duration,
    ) -> Self {
        let notifier = NotificationDispatcher::new(Arc::clone(&store), Arc::clone(&presence));
        Self {
            store,
            presence,
            notifier,
            persistence_timeout,
            transitions: DashMap::new(),
        }
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Bound a collaborator call; expiry surfaces as a retryable error.
    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T, RealtimeError> {
        match tokio::time::timeout(self.persistence_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                warn!(op, error = %e, "persistence call failed");
                RealtimeError::from(e)
            }),
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.persistence_timeout.as_millis() as u64,
                    "persistence call timed out"
                );
                Err(RealtimeError::PersistenceUnavailable(format!(
                    "{op} timed out after {}ms",
                    self.persistence_timeout.as_millis()
                )))
            }
        }
    }

    fn transition_lock(&self, principal_id: PrincipalId) -> Arc<Mutex<()>> {
        Arc::clone(self.transitions.entry(principal_id).or_default().value())
    }

    /// Forget the lock once no other connect or disconnect holds a handle.
    fn release_transition_lock(&self, principal_id: PrincipalId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.transitions
            .remove_if(&principal_id, |_, held| Arc::strong_count(held) == 1);
    }

    /// Register an authenticated connection.
    ///
    /// The connection joins its principal's personal room. The first live
    /// connection of a principal marks it online and announces it to others.
    pub async fn connect(
        &self,
        principal: &Principal,
        sender: EventSender,
    ) -> Result<Session, RealtimeError> {
        if !principal.is_active {
            return Err(RealtimeError::PrincipalInactive);
        }
        let lock = self.transition_lock(principal.id);
        let session = {
            let _guard = lock.lock().await;
            self.open(principal, sender).await
        };
        self.release_transition_lock(principal.id, lock);
        info!(
            connection_id = %session.connection_id,
            principal_id = principal.id,
            "realtime connection opened"
        );
        Ok(session)
    }

    async fn open(&self, principal: &Principal, sender: EventSender) -> Session {
        let registration = self.presence.register(principal.id, sender).await;
        let session = Session {
            connection_id: registration.connection_id,
            principal_id: principal.id,
        };
        self.presence
            .send_to(
                session.connection_id,
                ServerEvent::JoinedRoom {
                    room: RoomId::User(principal.id),
                },
            )
            .await;

        let now = Utc::now();
        let update = PresenceUpdate {
            online: true,
            last_seen_at: now,
        };
        if let Err(e) = self
            .bounded(
                "update_principal_presence",
                self.store.update_principal_presence(principal.id, update),
            )
            .await
        {
            warn!(principal_id = principal.id, error = %e, "could not record online presence");
        }
        if registration.came_online {
            self.presence
                .broadcast_to_others(
                    principal.id,
                    ServerEvent::PresenceChanged {
                        principal_id: principal.id,
                        status: PresenceStatus::Online,
                        last_seen_at: Some(now),
                    },
                )
                .await;
        }
        session
    }

    /// Tear down a connection. Only the principal's last connection marks it
    /// offline and broadcasts `presence-changed`.
    pub async fn disconnect(&self, session: &Session) {
        let lock = self.transition_lock(session.principal_id);
        {
            let _guard = lock.lock().await;
            self.close(session).await;
        }
        self.release_transition_lock(session.principal_id, lock);
    }

    async fn close(&self, session: &Session) {
        let Some(departure) = self.presence.unregister(session.connection_id).await else {
            return;
        };
        info!(
            connection_id = %session.connection_id,
            principal_id = departure.principal_id,
            went_offline = departure.went_offline,
            "realtime connection closed"
        );
        if !departure.went_offline {
            return;
        }
        let now = Utc::now();
        let update = PresenceUpdate {
            online: false,
            last_seen_at: now,
        };
        if let Err(e) = self
            .bounded(
                "update_principal_presence",
                self.store.update_principal_presence(departure.principal_id, update),
            )
            .await
        {
            warn!(
                principal_id = departure.principal_id,
                error = %e,
                "could not record offline presence"
            );
        }
        self.presence
            .broadcast_to_others(
                departure.principal_id,
                ServerEvent::PresenceChanged {
                    principal_id: departure.principal_id,
                    status: PresenceStatus::Offline,
                    last_seen_at: Some(now),
                },
            )
            .await;
    }

    /// Parse a text frame and handle it.
    pub async fn handle_text(&self, session: &Session, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.handle(session, event).await,
            Err(err) => self.reject(session, "unparsed", &err, None).await,
        }
    }

    /// Apply one client event. Errors go back to the sender only.
    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        let name = event.name();
        let room = event.room();
        if let Err(err) = self.dispatch(session, event).await {
            self.reject(session, name, &err, room).await;
        }
    }

    async fn reject(
        &self,
        session: &Session,
        event: &'static str,
        err: &RealtimeError,
        room: Option<RoomId>,
    ) {
        debug!(
            connection_id = %session.connection_id,
            principal_id = session.principal_id,
            event,
            code = err.code(),
            "event rejected: {err}"
        );
        self.presence
            .send_to(session.connection_id, ServerEvent::error(err, room))
            .await;
    }

    async fn dispatch(&self, session: &Session, event: ClientEvent) -> Result<(), RealtimeError> {
        match event {
            ClientEvent::JoinRoom { room } => self.join_room(session, room).await,
            ClientEvent::LeaveRoom { room } => {
                if room.is_personal() {
                    return Err(RealtimeError::ValidationFailed(
                        "the personal room cannot be left".into(),
                    ));
                }
                self.presence.leave(session.connection_id, &room).await;
                Ok(())
            }
            ClientEvent::SendMessage {
                room,
                content,
                message_type,
                mentions,
                parent_id,
            } => {
                self.send_message(
                    session,
                    NewMessage {
                        room,
                        sender_id: session.principal_id,
                        content,
                        message_type,
                        mentions,
                        parent_id,
                    },
                )
                .await
            }
            ClientEvent::TypingStart { room } => self.typing(session, room, true).await,
            ClientEvent::TypingStop { room } => self.typing(session, room, false).await,
            ClientEvent::UpdatePresence { status } => self.update_presence(session, status).await,
            ClientEvent::TaskUpdate {
                task_id,
                changes,
                assignee_id,
            } => self.task_update(session, task_id, changes, assignee_id).await,
        }
    }

    async fn require_joined(&self, session: &Session, room: RoomId) -> Result<(), RealtimeError> {
        if self.presence.is_member(session.connection_id, &room).await {
            Ok(())
        } else {
            Err(RealtimeError::RoomAccessDenied(room))
        }
    }

    async fn join_room(&self, session: &Session, room: RoomId) -> Result<(), RealtimeError> {
        let allowed = self
            .bounded("is_room_member", self.store.is_room_member(session.principal_id, &room))
            .await?;
        if !allowed {
            return Err(RealtimeError::RoomAccessDenied(room));
        }
        self.presence.join(session.connection_id, room).await;
        debug!(connection_id = %session.connection_id, %room, "joined room");
        self.presence
            .send_to(session.connection_id, ServerEvent::JoinedRoom { room })
            .await;
        Ok(())
    }

    /// Persist, fan out, then notify the other participants.
    async fn send_message(&self, session: &Session, new: NewMessage) -> Result<(), RealtimeError> {
        let room = new.room;
        self.require_joined(session, room).await?;

        let message = self
            .bounded("create_message", self.store.create_message(new))
            .await?;
        let delivered = self
            .presence
            .broadcast(
                &room,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;
        debug!(message_id = message.id, %room, delivered, "message delivered");

        self.notify_participants(&message).await;
        Ok(())
    }

    /// The message is already durable and delivered at this point, so
    /// failures are logged rather than reported to the sender.
    async fn notify_participants(&self, message: &Message) {
        let participants = match self
            .bounded("list_room_participants", self.store.list_room_participants(&message.room))
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!(message_id = message.id, error = %e, "skipping message notifications");
                return;
            }
        };
        let preview: String = match message.message_type {
            MessageType::Text | MessageType::System => {
                message.content.chars().take(PREVIEW_CHARS).collect()
            }
            MessageType::Image => "sent an image".to_string(),
            MessageType::File => "sent a file".to_string(),
        };
        for principal_id in participants
            .into_iter()
            .filter(|id| *id != message.sender_id)
        {
            let (kind, title) = if message.mentions.contains(&principal_id) {
                (NotificationKind::Mention, "You were mentioned")
            } else {
                (NotificationKind::MessageReceived, "New message")
            };
            let notification = NewNotification {
                kind,
                title: title.to_string(),
                content: preview.clone(),
                data: json!({
                    "messageId": message.id,
                    "room": message.room,
                    "senderId": message.sender_id,
                }),
            };
            if let Err(e) = self
                .bounded("create_notification", self.notifier.notify(principal_id, notification))
                .await
            {
                warn!(message_id = message.id, principal_id, error = %e, "notification not stored");
            }
        }
    }

    /// Typing indicators are relayed to other principals in the room and
    /// never stored.
    async fn typing(
        &self,
        session: &Session,
        room: RoomId,
        is_typing: bool,
    ) -> Result<(), RealtimeError> {
        self.require_joined(session, room).await?;
        self.presence
            .broadcast_excluding(
                &room,
                session.principal_id,
                ServerEvent::TypingIndicator {
                    room,
                    principal_id: session.principal_id,
                    is_typing,
                },
            )
            .await;
        Ok(())
    }

    async fn update_presence(
        &self,
        session: &Session,
        status: PresenceStatus,
    ) -> Result<(), RealtimeError> {
        let now = Utc::now();
        self.bounded(
            "update_principal_presence",
            self.store.update_principal_presence(
                session.principal_id,
                PresenceUpdate {
                    online: true,
                    last_seen_at: now,
                },
            ),
        )
        .await?;
        self.presence
            .broadcast_to_others(
                session.principal_id,
                ServerEvent::PresenceChanged {
                    principal_id: session.principal_id,
                    status,
                    last_seen_at: Some(now),
                },
            )
            .await;
        Ok(())
    }

    /// Relay a task change to the task room. The task itself was already
    /// written through the CRUD path; nothing is persisted here except an
    /// assignment notification.
    async fn task_update(
        &self,
        session: &Session,
        task_id: i64,
        changes: serde_json::Value,
        assignee_id: Option<PrincipalId>,
    ) -> Result<(), RealtimeError> {
        let room = RoomId::Task(task_id);
        let task = self
            .bounded("find_task", self.store.find_task(task_id))
            .await?
            .ok_or(RealtimeError::RoomAccessDenied(room))?;
        if !task.can_publish_update(session.principal_id) {
            return Err(RealtimeError::RoomAccessDenied(room));
        }

        self.presence
            .broadcast(
                &room,
                ServerEvent::TaskUpdated {
                    task_id,
                    updated_by: session.principal_id,
                    changes,
                    assignee_id,
                },
            )
            .await;

        if let Some(assignee) = assignee_id
            && assignee != session.principal_id
        {
            let notification = NewNotification {
                kind: NotificationKind::TaskAssigned,
                title: "Task assigned".to_string(),
                content: format!("You were assigned task #{task_id}"),
                data: json!({ "taskId": task_id, "assignedBy": session.principal_id }),
            };
            if let Err(e) = self
                .bounded("create_notification", self.notifier.notify(assignee, notification))
                .await
            {
                warn!(task_id, assignee, error = %e, "assignment notification not stored");
            }
        }
        Ok(())
    }
}
