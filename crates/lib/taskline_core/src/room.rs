//! Room identifiers — the routing keys of the real-time layer.
//!
//! Rooms are never persisted. The wire form is `<kind>:<id>`, e.g.
//! `user:4`, `project:7`, `task:12`, `conversation:1`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::auth::PrincipalId;

/// A logical broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoomId {
    /// Per-principal room used for cross-device delivery and notifications.
    User(PrincipalId),
    Project(i64),
    Task(i64),
    Conversation(i64),
}

/// Room kind, without the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    User,
    Project,
    Task,
    Conversation,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid room id: {0}")]
pub struct ParseRoomError(pub String);

impl RoomId {
    pub fn kind(&self) -> RoomKind {
        match self {
            Self::User(_) => RoomKind::User,
            Self::Project(_) => RoomKind::Project,
            Self::Task(_) => RoomKind::Task,
            Self::Conversation(_) => RoomKind::Conversation,
        }
    }

    /// Numeric identifier of the underlying entity.
    pub fn entity_id(&self) -> i64 {
        match self {
            Self::User(id) | Self::Project(id) | Self::Task(id) | Self::Conversation(id) => *id,
        }
    }

    /// Whether this is some principal's personal room.
    pub fn is_personal(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Project => "project",
            Self::Task => "task",
            Self::Conversation => "conversation",
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.entity_id())
    }
}

impl FromStr for RoomId {
    type Err = ParseRoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| ParseRoomError(s.to_string()))?;
        let id: i64 = id.parse().map_err(|_| ParseRoomError(s.to_string()))?;
        if id <= 0 {
            return Err(ParseRoomError(s.to_string()));
        }
        match kind {
            "user" => Ok(Self::User(id)),
            "project" => Ok(Self::Project(id)),
            "task" => Ok(Self::Task(id)),
            "conversation" => Ok(Self::Conversation(id)),
            _ => Err(ParseRoomError(s.to_string())),
        }
    }
}

impl TryFrom<String> for RoomId {
    type Error = ParseRoomError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.to_string()
    }
}
