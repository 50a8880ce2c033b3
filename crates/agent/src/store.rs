//! In-memory session map backed by snapshots on disk.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use agroquote_core::domain::session::{ConversationSummary, Session};
use agroquote_core::errors::Degrade;
use agroquote_db::SnapshotStore;

pub type SessionHandle = Arc<Mutex<Session>>;

struct Entry {
    session: SessionHandle,
    touched: DateTime<Utc>,
}

pub struct SessionStore {
    entries: RwLock<HashMap<String, Entry>>,
    snapshots: SnapshotStore,
}

impl SessionStore {
    pub fn new(snapshots: SnapshotStore) -> Self {
        Self { entries: RwLock::new(HashMap::new()), snapshots }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn ttl(&self) -> Duration {
        self.snapshots.ttl()
    }

    /// The live session for `id`: from memory, else from a valid snapshot,
    /// else a fresh one. Always refreshes the last-touched time.
    pub async fn get(&self, id: &str, now: DateTime<Utc>) -> SessionHandle {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.touched = now;
            return Arc::clone(&entry.session);
        }

        let loaded = self.snapshots.load(id, now).await.degrade("persistence.snapshot_load_failed", id).flatten();
        let session = match loaded {
            Some(session) => {
                debug!(event_name = "session.restored", conversation_id = %id, "session loaded from snapshot");
                session
            }
            None => Session::new(id),
        };

        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(id.to_string())
            .or_insert_with(|| Entry { session: Arc::new(Mutex::new(session)), touched: now });
        entry.touched = now;
        Arc::clone(&entry.session)
    }

    /// Writes the snapshot. Failures are logged and the in-memory copy stays
    /// authoritative.
    pub async fn persist(&self, session: &Session, now: DateTime<Utc>) -> bool {
        self.snapshots
            .save(session, now)
            .await
            .degrade("persistence.snapshot_failed", &session.id)
            .is_some()
    }

    /// Drops memory and disk state for `id` right away.
    pub async fn evict(&self, id: &str) {
        self.entries.write().await.remove(id);
        self.snapshots.remove(id).await.degrade("persistence.snapshot_remove_failed", id);
    }

    /// Removes sessions untouched for longer than the TTL. Snapshots stay;
    /// the disk sweep handles those.
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.touched >= cutoff);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids held in memory or present on disk.
    pub async fn known_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self.entries.read().await.keys().cloned().collect();
        if let Some(on_disk) = self.snapshots.ids().await.degrade("persistence.snapshot_list_failed", "sweep") {
            ids.extend(on_disk);
        }
        ids.into_iter().collect()
    }

    /// A copy of the session for `id` without loading it into memory or
    /// refreshing its last-touched time. Expired snapshots read as absent.
    pub async fn peek(&self, id: &str, now: DateTime<Utc>) -> Option<Session> {
        let live = self.entries.read().await.get(id).map(|entry| Arc::clone(&entry.session));
        match live {
            Some(handle) => Some(handle.lock().await.clone()),
            None => self.snapshots.load(id, now).await.degrade("persistence.snapshot_load_failed", id).flatten(),
        }
    }

    /// Conversation list, most recent activity first. Read-only: listing
    /// never keeps a session alive.
    pub async fn summaries(&self, now: DateTime<Utc>) -> Vec<ConversationSummary> {
        let mut summaries = Vec::new();
        for id in self.known_ids().await {
            if let Some(session) = self.peek(&id, now).await {
                summaries.push(session.summary(now));
            }
        }
        summaries.sort_by(|left, right| right.last_at.cmp(&left.last_at).then_with(|| left.id.cmp(&right.id)));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use agroquote_core::domain::session::Role;
    use agroquote_db::SnapshotStore;

    use super::SessionStore;

    fn store(dir: &TempDir) -> SessionStore {
        SessionStore::new(SnapshotStore::new(dir.path().join("sessions"), Duration::days(7)))
    }

    #[tokio::test]
    async fn get_returns_the_same_live_session() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        let now = Utc::now();

        let first = store.get("59170000001", now).await;
        first.lock().await.profile_name = Some("Juan Pérez".to_string());
        let second = store.get("59170000001", now).await;

        assert_eq!(second.lock().await.profile_name.as_deref(), Some("Juan Pérez"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn evicted_session_restarts_fresh_even_with_snapshot() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        let now = Utc::now();

        let handle = store.get("59170000002", now).await;
        {
            let mut session = handle.lock().await;
            session.profile_name = Some("Ana Rojas".to_string());
            assert!(store.persist(&session, now).await);
        }

        store.evict("59170000002").await;
        let fresh = store.get("59170000002", now).await;
        assert!(fresh.lock().await.profile_name.is_none());
    }

    #[tokio::test]
    async fn idle_sweep_keeps_snapshot_for_reload() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        let then = Utc::now() - Duration::days(3);

        let handle = store.get("59170000003", then).await;
        {
            let mut session = handle.lock().await;
            session.remember(Role::User, "Hola", then);
            store.persist(&session, then).await;
        }

        assert_eq!(store.sweep_idle(then + Duration::days(8)).await, 1);
        assert!(store.is_empty().await);

        let reloaded = store.get("59170000003", then + Duration::days(1)).await;
        assert_eq!(reloaded.lock().await.memory.len(), 1);
    }

    #[tokio::test]
    async fn summaries_include_disk_sessions_sorted_by_activity() {
        let dir = TempDir::new().expect("tempdir");
        let now = Utc::now();
        {
            let writer = store(&dir);
            for (id, minutes) in [("59170000004", 10), ("59170000005", 1)] {
                let handle = writer.get(id, now).await;
                let mut session = handle.lock().await;
                session.remember(Role::User, format!("hola {id}"), now - Duration::minutes(minutes));
                writer.persist(&session, now).await;
            }
        }

        let reader = store(&dir);
        let summaries = reader.summaries(now).await;
        let ids: Vec<&str> = summaries.iter().map(|summary| summary.id.as_str()).collect();
        assert_eq!(ids, vec!["59170000005", "59170000004"]);
        assert_eq!(summaries[0].unread, 1);
        assert!(reader.is_empty().await);
    }

    #[tokio::test]
    async fn listing_does_not_keep_idle_sessions_alive() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        let then = Utc::now() - Duration::days(8);

        let handle = store.get("59170000006", then).await;
        handle.lock().await.remember(Role::User, "Hola", then);

        let now = Utc::now();
        assert_eq!(store.summaries(now).await.len(), 1);
        assert_eq!(store.sweep_idle(now).await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn peek_skips_expired_snapshots_and_never_inserts() {
        let dir = TempDir::new().expect("tempdir");
        let then = Utc::now() - Duration::days(8);
        {
            let writer = store(&dir);
            let handle = writer.get("59170000007", then).await;
            let mut session = handle.lock().await;
            session.remember(Role::User, "Hola", then);
            writer.persist(&session, then).await;
        }

        let reader = store(&dir);
        assert!(reader.peek("59170000007", Utc::now()).await.is_none());
        assert!(reader.peek("59170000008", Utc::now()).await.is_none());
        assert!(reader.summaries(Utc::now()).await.is_empty());
        assert!(reader.is_empty().await);
    }
}
