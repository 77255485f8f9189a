//! Wire events for the bidirectional channel.
//!
//! Every frame is a JSON object with a `type` discriminator, e.g.
//! `{"type":"join-room","room":"project:7"}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RealtimeError;
use crate::models::auth::PrincipalId;
use crate::models::messaging::{Message, MessageType, Notification};
use crate::room::RoomId;

/// Upper bound on message content, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Upper bound on the number of mentions in one message.
pub const MAX_MENTIONS: usize = 50;

/// Principal-declared availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        room: RoomId,
    },
    LeaveRoom {
        room: RoomId,
    },
    SendMessage {
        room: RoomId,
        content: String,
        #[serde(default)]
        message_type: MessageType,
        #[serde(default)]
        mentions: Vec<PrincipalId>,
        #[serde(default)]
        parent_id: Option<i64>,
    },
    TypingStart {
        room: RoomId,
    },
    TypingStop {
        room: RoomId,
    },
    UpdatePresence {
        status: PresenceStatus,
    },
    TaskUpdate {
        task_id: i64,
        #[serde(default)]
        changes: serde_json::Value,
        #[serde(default)]
        assignee_id: Option<PrincipalId>,
    },
}

impl ClientEvent {
    /// Parse and validate a text frame.
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        let event: Self = serde_json::from_str(text)
            .map_err(|e| RealtimeError::ValidationFailed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Field-level checks serde cannot express.
    pub fn validate(&self) -> Result<(), RealtimeError> {
        match self {
            Self::SendMessage {
                content,
                mentions,
                parent_id,
                ..
            } => {
                if content.trim().is_empty() {
                    return Err(invalid("content must not be empty"));
                }
                if content.chars().count() > MAX_CONTENT_CHARS {
                    return Err(invalid(format!(
                        "content exceeds {MAX_CONTENT_CHARS} characters"
                    )));
                }
                if mentions.len() > MAX_MENTIONS {
                    return Err(invalid(format!("at most {MAX_MENTIONS} mentions allowed")));
                }
                if mentions.iter().any(|id| *id <= 0) {
                    return Err(invalid("mentions must be positive principal ids"));
                }
                if parent_id.is_some_and(|id| id <= 0) {
                    return Err(invalid("parentId must be positive"));
                }
            }
            Self::TaskUpdate {
                task_id,
                changes,
                assignee_id,
            } => {
                if *task_id <= 0 {
                    return Err(invalid("taskId must be positive"));
                }
                if !(changes.is_object() || changes.is_null()) {
                    return Err(invalid("changes must be an object"));
                }
                if assignee_id.is_some_and(|id| id <= 0) {
                    return Err(invalid("assigneeId must be positive"));
                }
            }
            Self::UpdatePresence { status } if *status == PresenceStatus::Offline => {
                return Err(invalid("offline is set by disconnecting"));
            }
            _ => {}
        }
        Ok(())
    }

    /// The room an event targets, if any.
    pub fn room(&self) -> Option<RoomId> {
        match self {
            Self::JoinRoom { room }
            | Self::LeaveRoom { room }
            | Self::SendMessage { room, .. }
            | Self::TypingStart { room }
            | Self::TypingStop { room } => Some(*room),
            Self::TaskUpdate { task_id, .. } => Some(RoomId::Task(*task_id)),
            Self::UpdatePresence { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom { .. } => "leave-room",
            Self::SendMessage { .. } => "send-message",
            Self::TypingStart { .. } => "typing-start",
            Self::TypingStop { .. } => "typing-stop",
            Self::UpdatePresence { .. } => "update-presence",
            Self::TaskUpdate { .. } => "task-update",
        }
    }
}

fn invalid(msg: impl Into<String>) -> RealtimeError {
    RealtimeError::ValidationFailed(msg.into())
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    JoinedRoom {
        room: RoomId,
    },
    NewMessage {
        message: Message,
    },
    Notification {
        notification: Notification,
    },
    PresenceChanged {
        principal_id: PrincipalId,
        status: PresenceStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_seen_at: Option<DateTime<Utc>>,
    },
    TypingIndicator {
        room: RoomId,
        principal_id: PrincipalId,
        is_typing: bool,
    },
    TaskUpdated {
        task_id: i64,
        updated_by: PrincipalId,
        changes: serde_json::Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        assignee_id: Option<PrincipalId>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<RoomId>,
        retryable: bool,
    },
}

impl ServerEvent {
    pub fn error(err: &RealtimeError, room: Option<RoomId>) -> Self {
        let room = match err {
            RealtimeError::RoomAccessDenied(r) => Some(*r),
            _ => room,
        };
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            room,
            retryable: err.retryable(),
        }
    }
}
