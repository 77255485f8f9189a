//! PostgreSQL [`Persistence`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{NotificationQuery, Persistence, StoreError, StoreResult};
use crate::models::auth::{
    NewPrincipal, Principal, PrincipalCredentials, PrincipalId, PresenceUpdate, Role,
};
use crate::models::messaging::{
    Message, NewMessage, NewNotification, Notification, NotificationKind, TaskRef,
};
use crate::room::RoomId;

type PrincipalRow = (
    i64,
    String,
    Option<String>,
    String,
    bool,
    bool,
    Option<DateTime<Utc>>,
);

type CredentialRow = (
    i64,
    String,
    Option<String>,
    String,
    bool,
    bool,
    Option<DateTime<Utc>>,
    String,
);

type NotificationRow = (
    i64,
    i64,
    String,
    String,
    String,
    serde_json::Value,
    bool,
    DateTime<Utc>,
);

const PRINCIPAL_COLUMNS: &str =
    "id, email, name, role, is_active, is_online, last_seen_at";

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, content, data, is_read, created_at";

/// Map driver errors: connectivity problems become `Unavailable`,
/// unique violations become `Conflict`.
fn classify(e: sqlx::Error) -> StoreError {
    if matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    ) {
        return StoreError::Unavailable(e.to_string());
    }
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return StoreError::Conflict(db.message().to_string());
    }
    StoreError::Database(e)
}

fn principal_from_row(row: PrincipalRow) -> StoreResult<Principal> {
    let (id, email, name, role, is_active, is_online, last_seen_at) = row;
    let role: Role = role.parse().map_err(StoreError::Corrupt)?;
    Ok(Principal {
        id,
        email,
        name,
        role,
        is_active,
        is_online,
        last_seen_at,
    })
}

fn notification_from_row(row: NotificationRow) -> StoreResult<Notification> {
    let (id, principal_id, kind, title, content, data, is_read, created_at) = row;
    let kind: NotificationKind = kind.parse().map_err(StoreError::Corrupt)?;
    Ok(Notification {
        id,
        principal_id,
        kind,
        title,
        content,
        data,
        is_read,
        created_at,
    })
}

/// Store backed by a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Persistence for PgStore {
    async fn find_principal_by_id(&self, id: PrincipalId) -> StoreResult<Option<Principal>> {
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(principal_from_row).transpose()
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<PrincipalCredentials>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {PRINCIPAL_COLUMNS}, password_hash FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        let Some((id, email, name, role, is_active, is_online, last_seen_at, password_hash)) = row
        else {
            return Ok(None);
        };
        let principal =
            principal_from_row((id, email, name, role, is_active, is_online, last_seen_at))?;
        Ok(Some(PrincipalCredentials {
            principal,
            password_hash,
        }))
    }

    async fn create_principal(&self, new: NewPrincipal) -> StoreResult<Principal> {
        let mut tx = self.pool.begin().await.map_err(classify)?;
        // Serialize registrations so exactly one of them sees an empty table.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('taskline.create_principal'))")
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        let row = sqlx::query_as::<_, PrincipalRow>(&format!(
            "INSERT INTO users (email, name, password_hash, role) \
             SELECT $1, $2, $3, CASE WHEN EXISTS (SELECT 1 FROM users) THEN $4 ELSE 'admin' END \
             RETURNING {PRINCIPAL_COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;
        tx.commit().await.map_err(classify)?;
        principal_from_row(row)
    }

    async fn update_principal_presence(
        &self,
        id: PrincipalId,
        update: PresenceUpdate,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE users SET is_online = $1, last_seen_at = $2 WHERE id = $3")
            .bind(update.online)
            .bind(update.last_seen_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn is_room_member(&self, principal_id: PrincipalId, room: &RoomId) -> StoreResult<bool> {
        let sql = match room {
            RoomId::User(id) => return Ok(*id == principal_id),
            RoomId::Conversation(_) => {
                "SELECT EXISTS(SELECT 1 FROM conversation_participants \
                 WHERE conversation_id = $1 AND user_id = $2)"
            }
            RoomId::Project(_) => {
                "SELECT EXISTS(SELECT 1 FROM projects p \
                 WHERE p.id = $1 AND (p.owner_id = $2 OR p.visibility = 'public' \
                   OR EXISTS(SELECT 1 FROM project_members m \
                             WHERE m.project_id = p.id AND m.user_id = $2)))"
            }
            RoomId::Task(_) => {
                "SELECT EXISTS(SELECT 1 FROM tasks t \
                 WHERE t.id = $1 AND (t.creator_id = $2 OR t.assignee_id = $2 \
                   OR EXISTS(SELECT 1 FROM task_watchers w \
                             WHERE w.task_id = t.id AND w.user_id = $2)))"
            }
        };
        let exists = sqlx::query_scalar::<_, bool>(sql)
            .bind(room.entity_id())
            .bind(principal_id)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(exists)
    }

    async fn list_room_participants(&self, room: &RoomId) -> StoreResult<Vec<PrincipalId>> {
        let sql = match room {
            RoomId::User(id) => return Ok(vec![*id]),
            RoomId::Conversation(_) => {
                "SELECT user_id FROM conversation_participants \
                 WHERE conversation_id = $1 ORDER BY user_id"
            }
            RoomId::Project(_) => {
                "SELECT owner_id FROM projects WHERE id = $1 \
                 UNION SELECT user_id FROM project_members WHERE project_id = $1 \
                 ORDER BY 1"
            }
            RoomId::Task(_) => {
                "SELECT creator_id FROM tasks WHERE id = $1 \
                 UNION SELECT assignee_id FROM tasks WHERE id = $1 AND assignee_id IS NOT NULL \
                 UNION SELECT user_id FROM task_watchers WHERE task_id = $1 \
                 ORDER BY 1"
            }
        };
        let ids = sqlx::query_scalar::<_, i64>(sql)
            .bind(room.entity_id())
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?;
        Ok(ids)
    }

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<TaskRef>> {
        let row = sqlx::query_as::<_, (i64, Option<i64>, i64, Option<i64>)>(
            "SELECT id, project_id, creator_id, assignee_id FROM tasks WHERE id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.map(|(id, project_id, creator_id, assignee_id)| TaskRef {
            id,
            project_id,
            creator_id,
            assignee_id,
        }))
    }

    async fn create_message(&self, new: NewMessage) -> StoreResult<Message> {
        let (id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO messages (room, sender_id, content, message_type, mentions, parent_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id, created_at",
        )
        .bind(new.room.to_string())
        .bind(new.sender_id)
        .bind(&new.content)
        .bind(new.message_type.as_str())
        .bind(&new.mentions)
        .bind(new.parent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(Message {
            id,
            room: new.room,
            sender_id: new.sender_id,
            content: new.content,
            message_type: new.message_type,
            mentions: new.mentions,
            parent_id: new.parent_id,
            created_at,
        })
    }

    async fn create_notification(
        &self,
        principal_id: PrincipalId,
        new: NewNotification,
    ) -> StoreResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (user_id, kind, title, content, data) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(principal_id)
        .bind(new.kind.as_str())
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.data)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        notification_from_row(row)
    }

    async fn create_notifications(
        &self,
        principal_ids: &[PrincipalId],
        new: NewNotification,
    ) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (user_id, kind, title, content, data) \
             SELECT u, $2, $3, $4, $5 FROM UNNEST($1::bigint[]) AS u \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(principal_ids)
        .bind(new.kind.as_str())
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.data)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(notification_from_row).collect()
    }

    async fn list_notifications(
        &self,
        principal_id: PrincipalId,
        query: NotificationQuery,
    ) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
             ORDER BY created_at DESC, id DESC LIMIT $3"
        ))
        .bind(principal_id)
        .bind(query.unread_only)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter().map(notification_from_row).collect()
    }

    async fn list_active_principal_ids(&self) -> StoreResult<Vec<PrincipalId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM users WHERE is_active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(ids)
    }
}
