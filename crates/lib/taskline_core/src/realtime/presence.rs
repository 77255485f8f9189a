//! Session/presence registry.
//!
//! Tracks live connections, their room memberships and the set of
//! connections per principal. A principal is online while at least one of
//! its connections is registered. Room membership is only ever added through
//! [`PresenceRegistry::join`], which callers invoke after an authorization
//! check; nothing here infers membership.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::events::ServerEvent;
use crate::models::auth::PrincipalId;
use crate::room::RoomId;

/// Outbound queue for one connection.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Identifier of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of registering a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub connection_id: ConnectionId,
    /// True when this is the principal's first live connection.
    pub came_online: bool,
}

/// Result of unregistering a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub principal_id: PrincipalId,
    /// True when the principal has no live connections left.
    pub went_offline: bool,
    pub rooms: Vec<RoomId>,
}

#[derive(Debug)]
struct ConnectionEntry {
    principal_id: PrincipalId,
    rooms: HashSet<RoomId>,
    sender: EventSender,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    principals: HashMap<PrincipalId, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn add_to_room(&mut self, connection_id: ConnectionId, room: RoomId) -> bool {
        let Some(entry) = self.connections.get_mut(&connection_id) else {
            return false;
        };
        entry.rooms.insert(room);
        self.rooms.entry(room).or_default().insert(connection_id)
    }

    fn remove_from_room(&mut self, connection_id: ConnectionId, room: &RoomId) -> bool {
        if let Some(entry) = self.connections.get_mut(&connection_id) {
            entry.rooms.remove(room);
        }
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&connection_id);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Clone the senders matching `keep`, so delivery happens outside the lock.
    fn room_senders(
        &self,
        room: &RoomId,
        keep: impl Fn(&ConnectionEntry) -> bool,
    ) -> Vec<EventSender> {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id))
            .filter(|entry| keep(entry))
            .map(|entry| entry.sender.clone())
            .collect()
    }
}

fn deliver(senders: Vec<EventSender>, event: &ServerEvent) -> usize {
    senders
        .into_iter()
        .filter(|tx| tx.send(event.clone()).is_ok())
        .count()
}

/// Process-wide registry of live connections.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    state: RwLock<RegistryState>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and join it to the principal's personal room.
    pub async fn register(&self, principal_id: PrincipalId, sender: EventSender) -> Registration {
        let connection_id = ConnectionId::new();
        let mut state = self.state.write().await;
        state.connections.insert(
            connection_id,
            ConnectionEntry {
                principal_id,
                rooms: HashSet::new(),
                sender,
            },
        );
        let conns = state.principals.entry(principal_id).or_default();
        conns.insert(connection_id);
        let came_online = conns.len() == 1;
        state.add_to_room(connection_id, RoomId::User(principal_id));
        debug!(%connection_id, principal_id, came_online, "connection registered");
        Registration {
            connection_id,
            came_online,
        }
    }

    /// Remove a connection and all of its room memberships.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<Departure> {
        let mut state = self.state.write().await;
        let entry = state.connections.remove(&connection_id)?;
        for room in &entry.rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(&connection_id);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        let went_offline = match state.principals.get_mut(&entry.principal_id) {
            Some(conns) => {
                conns.remove(&connection_id);
                conns.is_empty()
            }
            None => true,
        };
        if went_offline {
            state.principals.remove(&entry.principal_id);
        }
        debug!(
            %connection_id,
            principal_id = entry.principal_id,
            went_offline,
            "connection unregistered"
        );
        Some(Departure {
            principal_id: entry.principal_id,
            went_offline,
            rooms: entry.rooms.into_iter().collect(),
        })
    }

    /// Record a membership. Callers must have authorized it already.
    /// Returns false for an unknown connection or an existing membership.
    pub async fn join(&self, connection_id: ConnectionId, room: RoomId) -> bool {
        self.state.write().await.add_to_room(connection_id, room)
    }

    /// Drop a membership. Leaving a room never joined is a no-op.
    ///
    /// A connection stays in its personal room until it unregisters, so
    /// [`is_online`](Self::is_online) and
    /// [`connections_of`](Self::connections_of) always agree.
    pub async fn leave(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        if room.is_personal() {
            return false;
        }
        self.state.write().await.remove_from_room(connection_id, room)
    }

    pub async fn is_member(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        self.state
            .read()
            .await
            .connections
            .get(&connection_id)
            .is_some_and(|entry| entry.rooms.contains(room))
    }

    /// Number of connections currently joined to `room`.
    pub async fn room_size(&self, room: &RoomId) -> usize {
        self.state.read().await.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Online means the personal room has at least one member.
    pub async fn is_online(&self, principal_id: PrincipalId) -> bool {
        self.room_size(&RoomId::User(principal_id)).await > 0
    }

    pub async fn connections_of(&self, principal_id: PrincipalId) -> usize {
        self.state
            .read()
            .await
            .principals
            .get(&principal_id)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Send to one connection. Returns whether it was delivered.
    pub async fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let sender = self
            .state
            .read()
            .await
            .connections
            .get(&connection_id)
            .map(|entry| entry.sender.clone());
        sender.is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Fan out to every connection joined to `room` at the time of the call.
    /// Returns the number of connections the event was queued for.
    pub async fn broadcast(&self, room: &RoomId, event: ServerEvent) -> usize {
        let senders = self.state.read().await.room_senders(room, |_| true);
        deliver(senders, &event)
    }

    /// Fan out to `room`, skipping every connection of `principal_id`.
    pub async fn broadcast_excluding(
        &self,
        room: &RoomId,
        principal_id: PrincipalId,
        event: ServerEvent,
    ) -> usize {
        let senders = self
            .state
            .read()
            .await
            .room_senders(room, |entry| entry.principal_id != principal_id);
        deliver(senders, &event)
    }

    /// Send to every live connection that belongs to another principal.
    pub async fn broadcast_to_others(
        &self,
        principal_id: PrincipalId,
        event: ServerEvent,
    ) -> usize {
        let senders: Vec<EventSender> = self
            .state
            .read()
            .await
            .connections
            .values()
            .filter(|entry| entry.principal_id != principal_id)
            .map(|entry| entry.sender.clone())
            .collect();
        deliver(senders, &event)
    }
}
