//! In-process refresh-token registry with expiry sweeping.
//!
//! Entries are keyed by the SHA-256 digest of the token string, so the raw
//! token never sits in memory longer than the request that carried it. The
//! registry is not durable: a restart invalidates every refresh token.
//!
//! Every check-then-delete goes through a single `DashMap` shard operation
//! (`remove_if`, `retain`), so the periodic sweep, an explicit revoke and a
//! failed refresh can race on the same entry without double-removal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::auth::PrincipalId;

/// Default sweep interval: 1 hour.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Server-side record for an issued refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRecord {
    pub principal_id: PrincipalId,
    pub expires_at: DateTime<Utc>,
}

/// Result of looking up a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshLookup {
    Valid(RefreshRecord),
    /// The entry existed but had expired; it has been removed.
    Expired,
    Missing,
}

/// Registry of live refresh tokens.
#[derive(Debug, Default)]
pub struct RefreshTokenStore {
    entries: DashMap<String, RefreshRecord>,
}

/// SHA-256 hex digest used as the registry key.
fn registry_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RefreshTokenStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, token: &str, record: RefreshRecord) {
        self.entries.insert(registry_key(token), record);
    }

    /// Look up a token, removing it atomically if it has expired at `now`.
    pub fn lookup(&self, token: &str, now: DateTime<Utc>) -> RefreshLookup {
        let key = registry_key(token);
        if self
            .entries
            .remove_if(&key, |_, record| record.expires_at <= now)
            .is_some()
        {
            return RefreshLookup::Expired;
        }
        match self.entries.get(&key) {
            Some(record) => RefreshLookup::Valid(*record),
            None => RefreshLookup::Missing,
        }
    }

    /// Remove a token. Returns whether an entry was present; absent is not an error.
    pub fn remove(&self, token: &str) -> bool {
        self.entries.remove(&registry_key(token)).is_some()
    }

    /// Remove every token held by `principal_id`. Returns the count removed.
    pub fn remove_principal(&self, principal_id: PrincipalId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, record| record.principal_id != principal_id);
        before.saturating_sub(self.entries.len())
    }

    /// Delete entries whose expiry has passed at `now`. Returns the count removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, record| {
            let keep = record.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the periodic sweep. Stops when `shutdown` is cancelled.
    pub fn spawn_sweep_task(
        self: &Arc<Self>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick completes immediately; skip it so the first sweep
            // happens one interval after startup.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("refresh token sweep stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = store.sweep(Utc::now());
                        if removed > 0 {
                            info!(removed, remaining = store.len(), "swept expired refresh tokens");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record(principal_id: PrincipalId, expires_at: DateTime<Utc>) -> RefreshRecord {
        RefreshRecord {
            principal_id,
            expires_at,
        }
    }

    #[test]
    fn lookup_missing_token() {
        let store = RefreshTokenStore::new();
        assert_eq!(store.lookup("nope", Utc::now()), RefreshLookup::Missing);
    }

    #[test]
    fn lookup_valid_token() {
        let store = RefreshTokenStore::new();
        let now = Utc::now();
        let rec = record(1, now + ChronoDuration::days(7));
        store.insert("t1", rec);
        assert_eq!(store.lookup("t1", now), RefreshLookup::Valid(rec));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookup_expired_token_removes_it() {
        let store = RefreshTokenStore::new();
        let now = Utc::now();
        store.insert("t1", record(1, now + ChronoDuration::days(7)));
        let later = now + ChronoDuration::days(8);
        assert_eq!(store.lookup("t1", later), RefreshLookup::Expired);
        assert!(store.is_empty());
        assert_eq!(store.lookup("t1", later), RefreshLookup::Missing);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = RefreshTokenStore::new();
        store.insert("t1", record(1, Utc::now() + ChronoDuration::days(1)));
        assert!(store.remove("t1"));
        assert!(!store.remove("t1"));
        assert!(!store.remove("never-issued"));
    }

    #[test]
    fn sweep_removes_only_expired_and_is_idempotent() {
        let store = RefreshTokenStore::new();
        let now = Utc::now();
        store.insert("old", record(1, now - ChronoDuration::seconds(1)));
        store.insert("older", record(2, now - ChronoDuration::days(3)));
        store.insert("fresh", record(3, now + ChronoDuration::days(3)));

        assert_eq!(store.sweep(now), 2);
        assert_eq!(store.sweep(now), 0);
        assert_eq!(store.len(), 1);
        assert!(matches!(store.lookup("fresh", now), RefreshLookup::Valid(_)));
    }

    #[test]
    fn remove_principal_drops_all_their_tokens() {
        let store = RefreshTokenStore::new();
        let exp = Utc::now() + ChronoDuration::days(1);
        store.insert("a", record(1, exp));
        store.insert("b", record(1, exp));
        store.insert("c", record(2, exp));
        assert_eq!(store.remove_principal(1), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn racing_sweep_and_lookup_remove_an_expired_entry_once() {
        let now = Utc::now();
        for _ in 0..200 {
            let store = RefreshTokenStore::new();
            store.insert("stale", record(1, now - ChronoDuration::seconds(1)));
            let (swept, looked_up) = std::thread::scope(|s| {
                let sweeper = s.spawn(|| store.sweep(now));
                let reader = s.spawn(|| store.lookup("stale", now));
                (sweeper.join().unwrap(), reader.join().unwrap())
            });
            let by_lookup = usize::from(looked_up == RefreshLookup::Expired);
            assert_eq!(swept + by_lookup, 1);
            assert!(store.is_empty());
        }
    }

    #[test]
    fn racing_sweep_and_revoke_remove_an_expired_entry_once() {
        let now = Utc::now();
        for _ in 0..200 {
            let store = RefreshTokenStore::new();
            store.insert("stale", record(1, now - ChronoDuration::seconds(1)));
            let (swept, revoked) = std::thread::scope(|s| {
                let sweeper = s.spawn(|| store.sweep(now));
                let revoker = s.spawn(|| store.remove("stale"));
                (sweeper.join().unwrap(), revoker.join().unwrap())
            });
            assert_eq!(swept + usize::from(revoked), 1);
            assert!(store.is_empty());
        }
    }

    #[test]
    fn raw_token_is_not_used_as_key() {
        let key = registry_key("secret-token");
        assert_eq!(key.len(), 64);
        assert_ne!(key, "secret-token");
    }

    #[tokio::test]
    async fn sweep_task_stops_on_cancel() {
        let store = Arc::new(RefreshTokenStore::new());
        let shutdown = CancellationToken::new();
        let handle = store.spawn_sweep_task(Duration::from_millis(10), shutdown.clone());
        store.insert("gone", record(1, Utc::now() - ChronoDuration::seconds(5)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());
        shutdown.cancel();
        handle.await.unwrap();
    }
}
