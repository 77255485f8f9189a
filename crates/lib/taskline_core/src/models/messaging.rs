//! Message, notification and task reference models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::PrincipalId;
use crate::room::RoomId;

/// Message content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

/// Persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub room: RoomId,
    pub sender_id: PrincipalId,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub mentions: Vec<PrincipalId>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Input for `create_message`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub room: RoomId,
    pub sender_id: PrincipalId,
    pub content: String,
    pub message_type: MessageType,
    pub mentions: Vec<PrincipalId>,
    pub parent_id: Option<i64>,
}

/// Notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MessageReceived,
    Mention,
    TaskAssigned,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageReceived => "message_received",
            Self::Mention => "mention",
            Self::TaskAssigned => "task_assigned",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message_received" => Ok(Self::MessageReceived),
            "mention" => Ok(Self::Mention),
            "task_assigned" => Ok(Self::TaskAssigned),
            "system" => Ok(Self::System),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

/// Persisted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub principal_id: PrincipalId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Notification body, recipient supplied separately.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub data: serde_json::Value,
}

/// The parts of a task the real-time layer needs for authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: i64,
    pub project_id: Option<i64>,
    pub creator_id: PrincipalId,
    pub assignee_id: Option<PrincipalId>,
}

impl TaskRef {
    /// Assignee or creator may publish task updates.
    pub fn can_publish_update(&self, principal_id: PrincipalId) -> bool {
        self.creator_id == principal_id || self.assignee_id == Some(principal_id)
    }
}
