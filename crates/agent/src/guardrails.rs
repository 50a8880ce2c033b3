//! Duplicate-delivery and reentrancy guards for inbound events.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport message ids seen within a sliding window.
pub struct SeenSet {
    window: Duration,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SeenSet {
    pub fn new(window: Duration) -> Self {
        Self { window, seen: Mutex::new(HashMap::new()) }
    }

    /// True the first time an id shows up inside the window; later calls
    /// with the same id return false until the window has passed.
    pub fn first_sighting(&self, message_id: &str, now: DateTime<Utc>) -> bool {
        let mut seen = lock(&self.seen);
        let fresh = seen.get(message_id).map_or(true, |at| now - *at >= self.window);
        if fresh {
            seen.insert(message_id.to_string(), now);
        }
        fresh
    }

    /// Forgets ids older than the window; returns how many went.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut seen = lock(&self.seen);
        let before = seen.len();
        seen.retain(|_, at| now - *at < self.window);
        before - seen.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.seen).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Conversations whose turn is currently being computed.
#[derive(Clone, Default)]
pub struct BusySet {
    active: Arc<Mutex<HashSet<String>>>,
}

/// Marks a conversation busy until dropped.
pub struct BusyGuard {
    id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl BusySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another task already holds the conversation.
    pub fn try_acquire(&self, conversation_id: &str) -> Option<BusyGuard> {
        let mut active = lock(&self.active);
        if !active.insert(conversation_id.to_string()) {
            return None;
        }
        Some(BusyGuard { id: conversation_id.to_string(), active: Arc::clone(&self.active) })
    }

    pub fn is_busy(&self, conversation_id: &str) -> bool {
        lock(&self.active).contains(conversation_id)
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{BusySet, SeenSet};

    #[test]
    fn repeated_message_id_is_seen_once_per_window() {
        let seen = SeenSet::new(Duration::minutes(5));
        let now = Utc::now();

        assert!(seen.first_sighting("wamid.A", now));
        assert!(!seen.first_sighting("wamid.A", now + Duration::seconds(30)));
        assert!(seen.first_sighting("wamid.B", now));
        assert!(seen.first_sighting("wamid.A", now + Duration::minutes(6)));
    }

    #[test]
    fn prune_drops_expired_ids() {
        let seen = SeenSet::new(Duration::minutes(5));
        let now = Utc::now();
        seen.first_sighting("wamid.old", now - Duration::minutes(10));
        seen.first_sighting("wamid.new", now);

        assert_eq!(seen.prune(now), 1);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn busy_guard_releases_on_drop() {
        let busy = BusySet::new();
        let guard = busy.try_acquire("59170000001").expect("first acquire");

        assert!(busy.try_acquire("59170000001").is_none());
        assert!(busy.try_acquire("59170000002").is_some());
        assert!(busy.is_busy("59170000001"));

        drop(guard);
        assert!(!busy.is_busy("59170000001"));
        assert!(busy.try_acquire("59170000001").is_some());
    }
}
