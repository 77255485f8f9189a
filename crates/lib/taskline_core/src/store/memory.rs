//! In-memory [`Persistence`] implementation.
//!
//! Used by the test suites and by `taskline_api_server --in-memory`.
//! Supports failure injection (`set_unavailable`, `set_write_delay`) so the
//! real-time layer's persistence-failure paths can be exercised.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{NotificationQuery, Persistence, StoreError, StoreResult};
use crate::models::auth::{
    NewPrincipal, Principal, PrincipalCredentials, PrincipalId, PresenceUpdate, Role,
};
use crate::models::messaging::{Message, NewMessage, NewNotification, Notification, TaskRef};
use crate::room::RoomId;

/// Project visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone)]
struct ProjectRow {
    owner_id: PrincipalId,
    visibility: Visibility,
    members: BTreeSet<PrincipalId>,
}

#[derive(Debug, Clone)]
struct TaskRow {
    task: TaskRef,
    watchers: BTreeSet<PrincipalId>,
}

#[derive(Debug, Default)]
struct Tables {
    principals: HashMap<PrincipalId, PrincipalCredentials>,
    projects: HashMap<i64, ProjectRow>,
    tasks: HashMap<i64, TaskRow>,
    conversations: HashMap<i64, BTreeSet<PrincipalId>>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_notification(
        &mut self,
        principal_id: PrincipalId,
        new: &NewNotification,
    ) -> Notification {
        let notification = Notification {
            id: self.next_id(),
            principal_id,
            kind: new.kind,
            title: new.title.clone(),
            content: new.content.clone(),
            data: new.data.clone(),
            is_read: false,
            created_at: Utc::now(),
        };
        self.notifications.push(notification.clone());
        notification
    }
}

/// Process-local store backed by hash maps.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every operation fails with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay applied before every message/notification write.
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".into()));
        }
        Ok(())
    }

    async fn write_delay(&self) {
        let ms = self.write_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Seed a principal with a ready-made password hash. Returns its id.
    pub async fn add_principal(
        &self,
        email: &str,
        role: Role,
        password_hash: &str,
    ) -> PrincipalId {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        t.principals.insert(
            id,
            PrincipalCredentials {
                principal: Principal {
                    id,
                    email: email.to_string(),
                    name: None,
                    role,
                    is_active: true,
                    is_online: false,
                    last_seen_at: None,
                },
                password_hash: password_hash.to_string(),
            },
        );
        id
    }

    pub async fn set_active(&self, id: PrincipalId, active: bool) {
        if let Some(row) = self.tables.write().await.principals.get_mut(&id) {
            row.principal.is_active = active;
        }
    }

    /// Remove a principal entirely (used to test refresh for deleted accounts).
    pub async fn remove_principal(&self, id: PrincipalId) {
        self.tables.write().await.principals.remove(&id);
    }

    pub async fn add_conversation(&self, participants: &[PrincipalId]) -> i64 {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        t.conversations
            .insert(id, participants.iter().copied().collect());
        id
    }

    pub async fn add_project(
        &self,
        owner_id: PrincipalId,
        visibility: Visibility,
        members: &[PrincipalId],
    ) -> i64 {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        t.projects.insert(
            id,
            ProjectRow {
                owner_id,
                visibility,
                members: members.iter().copied().collect(),
            },
        );
        id
    }

    pub async fn add_task(
        &self,
        project_id: Option<i64>,
        creator_id: PrincipalId,
        assignee_id: Option<PrincipalId>,
        watchers: &[PrincipalId],
    ) -> i64 {
        let mut t = self.tables.write().await;
        let id = t.next_id();
        t.tasks.insert(
            id,
            TaskRow {
                task: TaskRef {
                    id,
                    project_id,
                    creator_id,
                    assignee_id,
                },
                watchers: watchers.iter().copied().collect(),
            },
        );
        id
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.tables.read().await.messages.clone()
    }

    pub async fn notifications_for(&self, principal_id: PrincipalId) -> Vec<Notification> {
        self.tables
            .read()
            .await
            .notifications
            .iter()
            .filter(|n| n.principal_id == principal_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Persistence for InMemoryStore {
    async fn find_principal_by_id(&self, id: PrincipalId) -> StoreResult<Option<Principal>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .principals
            .get(&id)
            .map(|row| row.principal.clone()))
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<PrincipalCredentials>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .principals
            .values()
            .find(|row| row.principal.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_principal(&self, new: NewPrincipal) -> StoreResult<Principal> {
        self.check_available()?;
        let mut t = self.tables.write().await;
        if t
            .principals
            .values()
            .any(|row| row.principal.email.eq_ignore_ascii_case(&new.email))
        {
            return Err(StoreError::Conflict(format!(
                "email already registered: {}",
                new.email
            )));
        }
        let role = if t.principals.is_empty() {
            Role::Admin
        } else {
            new.role
        };
        let id = t.next_id();
        let principal = Principal {
            id,
            email: new.email,
            name: new.name,
            role,
            is_active: true,
            is_online: false,
            last_seen_at: None,
        };
        t.principals.insert(
            id,
            PrincipalCredentials {
                principal: principal.clone(),
                password_hash: new.password_hash,
            },
        );
        Ok(principal)
    }

    async fn update_principal_presence(
        &self,
        id: PrincipalId,
        update: PresenceUpdate,
    ) -> StoreResult<()> {
        self.check_available()?;
        if let Some(row) = self.tables.write().await.principals.get_mut(&id) {
            row.principal.is_online = update.online;
            row.principal.last_seen_at = Some(update.last_seen_at);
        }
        Ok(())
    }

    async fn is_room_member(&self, principal_id: PrincipalId, room: &RoomId) -> StoreResult<bool> {
        self.check_available()?;
        let t = self.tables.read().await;
        let member = match room {
            RoomId::User(id) => *id == principal_id,
            RoomId::Conversation(id) => t
                .conversations
                .get(id)
                .is_some_and(|p| p.contains(&principal_id)),
            RoomId::Project(id) => t.projects.get(id).is_some_and(|p| {
                p.owner_id == principal_id
                    || p.visibility == Visibility::Public
                    || p.members.contains(&principal_id)
            }),
            RoomId::Task(id) => t.tasks.get(id).is_some_and(|row| {
                row.task.can_publish_update(principal_id) || row.watchers.contains(&principal_id)
            }),
        };
        Ok(member)
    }

    async fn list_room_participants(&self, room: &RoomId) -> StoreResult<Vec<PrincipalId>> {
        self.check_available()?;
        let t = self.tables.read().await;
        let ids: BTreeSet<PrincipalId> = match room {
            RoomId::User(id) => BTreeSet::from([*id]),
            RoomId::Conversation(id) => t.conversations.get(id).cloned().unwrap_or_default(),
            RoomId::Project(id) => t
                .projects
                .get(id)
                .map(|p| {
                    let mut ids = p.members.clone();
                    ids.insert(p.owner_id);
                    ids
                })
                .unwrap_or_default(),
            RoomId::Task(id) => t
                .tasks
                .get(id)
                .map(|row| {
                    let mut ids = row.watchers.clone();
                    ids.insert(row.task.creator_id);
                    ids.extend(row.task.assignee_id);
                    ids
                })
                .unwrap_or_default(),
        };
        Ok(ids.into_iter().collect())
    }

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<TaskRef>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .tasks
            .get(&task_id)
            .map(|row| row.task.clone()))
    }

    async fn create_message(&self, new: NewMessage) -> StoreResult<Message> {
        self.write_delay().await;
        self.check_available()?;
        let mut t = self.tables.write().await;
        let message = Message {
            id: t.next_id(),
            room: new.room,
            sender_id: new.sender_id,
            content: new.content,
            message_type: new.message_type,
            mentions: new.mentions,
            parent_id: new.parent_id,
            created_at: Utc::now(),
        };
        t.messages.push(message.clone());
        Ok(message)
    }

    async fn create_notification(
        &self,
        principal_id: PrincipalId,
        new: NewNotification,
    ) -> StoreResult<Notification> {
        self.write_delay().await;
        self.check_available()?;
        Ok(self
            .tables
            .write()
            .await
            .insert_notification(principal_id, &new))
    }

    async fn create_notifications(
        &self,
        principal_ids: &[PrincipalId],
        new: NewNotification,
    ) -> StoreResult<Vec<Notification>> {
        self.write_delay().await;
        self.check_available()?;
        let mut t = self.tables.write().await;
        Ok(principal_ids
            .iter()
            .map(|id| t.insert_notification(*id, &new))
            .collect())
    }

    async fn list_notifications(
        &self,
        principal_id: PrincipalId,
        query: NotificationQuery,
    ) -> StoreResult<Vec<Notification>> {
        self.check_available()?;
        let t = self.tables.read().await;
        let limit = usize::try_from(query.limit.max(0)).unwrap_or(0);
        Ok(t.notifications
            .iter()
            .rev()
            .filter(|n| n.principal_id == principal_id && (!query.unread_only || !n.is_read))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_active_principal_ids(&self) -> StoreResult<Vec<PrincipalId>> {
        self.check_available()?;
        let t = self.tables.read().await;
        let mut ids: Vec<PrincipalId> = t
            .principals
            .values()
            .filter(|row| row.principal.is_active)
            .map(|row| row.principal.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::messaging::NotificationKind;

    #[tokio::test]
    async fn conversation_membership() {
        let store = InMemoryStore::new();
        let a = store.add_principal("a@x.io", Role::Member, "h").await;
        let b = store.add_principal("b@x.io", Role::Member, "h").await;
        let c = store.add_principal("c@x.io", Role::Member, "h").await;
        let conv = store.add_conversation(&[a, b]).await;
        let room = RoomId::Conversation(conv);

        assert!(store.is_room_member(a, &room).await.unwrap());
        assert!(!store.is_room_member(c, &room).await.unwrap());
        assert_eq!(store.list_room_participants(&room).await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn project_membership_respects_visibility() {
        let store = InMemoryStore::new();
        let owner = store.add_principal("o@x.io", Role::Manager, "h").await;
        let member = store.add_principal("m@x.io", Role::Member, "h").await;
        let outsider = store.add_principal("x@x.io", Role::Member, "h").await;
        let private = store.add_project(owner, Visibility::Private, &[member]).await;
        let public = store.add_project(owner, Visibility::Public, &[]).await;

        let room = RoomId::Project(private);
        assert!(store.is_room_member(owner, &room).await.unwrap());
        assert!(store.is_room_member(member, &room).await.unwrap());
        assert!(!store.is_room_member(outsider, &room).await.unwrap());
        assert!(store
            .is_room_member(outsider, &RoomId::Project(public))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn task_membership_includes_watchers() {
        let store = InMemoryStore::new();
        let creator = store.add_principal("c@x.io", Role::Member, "h").await;
        let assignee = store.add_principal("a@x.io", Role::Member, "h").await;
        let watcher = store.add_principal("w@x.io", Role::Member, "h").await;
        let other = store.add_principal("o@x.io", Role::Member, "h").await;
        let task = store.add_task(None, creator, Some(assignee), &[watcher]).await;
        let room = RoomId::Task(task);

        for id in [creator, assignee, watcher] {
            assert!(store.is_room_member(id, &room).await.unwrap());
        }
        assert!(!store.is_room_member(other, &room).await.unwrap());
        assert_eq!(
            store.list_room_participants(&room).await.unwrap(),
            vec![creator, assignee, watcher]
        );
    }

    #[tokio::test]
    async fn unknown_rooms_have_no_members() {
        let store = InMemoryStore::new();
        let a = store.add_principal("a@x.io", Role::Member, "h").await;
        assert!(!store.is_room_member(a, &RoomId::Conversation(99)).await.unwrap());
        assert!(store
            .list_room_participants(&RoomId::Task(99))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = InMemoryStore::new();
        let new = NewPrincipal {
            email: "dup@x.io".into(),
            name: None,
            password_hash: "h".into(),
            role: Role::Member,
        };
        store.create_principal(new.clone()).await.unwrap();
        assert!(matches!(
            store.create_principal(new).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn only_the_first_principal_becomes_admin() {
        let store = InMemoryStore::new();
        let new = |email: &str| NewPrincipal {
            email: email.into(),
            name: None,
            password_hash: "h".into(),
            role: Role::Member,
        };
        let first = store.create_principal(new("a@x.io")).await.unwrap();
        assert_eq!(first.role, Role::Admin);

        store.set_active(first.id, false).await;
        let second = store.create_principal(new("b@x.io")).await.unwrap();
        assert_eq!(second.role, Role::Member, "deactivated principals still count");
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.find_principal_by_id(1).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn notifications_list_newest_first_with_unread_filter() {
        let store = InMemoryStore::new();
        let a = store.add_principal("a@x.io", Role::Member, "h").await;
        for title in ["one", "two", "three"] {
            store
                .create_notification(
                    a,
                    NewNotification {
                        kind: NotificationKind::System,
                        title: title.into(),
                        content: String::new(),
                        data: serde_json::Value::Null,
                    },
                )
                .await
                .unwrap();
        }
        let listed = store
            .list_notifications(a, NotificationQuery { unread_only: true, limit: 2 })
            .await
            .unwrap();
        let titles: Vec<_> = listed.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["three", "two"]);
    }
}
