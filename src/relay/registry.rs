//! Relay Registry
//!
//! Active relays keyed by target channel id. At most one session exists
//! per target; `try_insert_with` enforces it under the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::session::{RelaySession, RelayStats};

#[derive(Debug, Default)]
pub struct RelayRegistry {
    sessions: Mutex<HashMap<String, Arc<RelaySession>>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<RelaySession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has(&self, target_channel_id: &str) -> bool {
        self.lock().contains_key(target_channel_id)
    }

    pub fn get(&self, target_channel_id: &str) -> Option<Arc<RelaySession>> {
        self.lock().get(target_channel_id).cloned()
    }

    /// Build and insert a session only if `target_channel_id` is free.
    ///
    /// `build` runs while the registry is locked, so it must not block.
    /// Returns `None` without calling `build` when the target is taken.
    pub fn try_insert_with<F>(&self, target_channel_id: &str, build: F) -> Option<Arc<RelaySession>>
    where
        F: FnOnce() -> RelaySession,
    {
        let mut sessions = self.lock();
        if sessions.contains_key(target_channel_id) {
            return None;
        }
        let session = Arc::new(build());
        sessions.insert(target_channel_id.to_string(), Arc::clone(&session));
        Some(session)
    }

    pub fn remove(&self, target_channel_id: &str) -> Option<Arc<RelaySession>> {
        self.lock().remove(target_channel_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stats of every active session, ordered by target channel
    pub fn snapshot(&self) -> Vec<RelayStats> {
        let mut stats: Vec<RelayStats> = self.lock().values().map(|s| s.to_stats()).collect();
        stats.sort_by(|a, b| a.target_channel_id.cmp(&b.target_channel_id));
        stats
    }

    /// Remove and return every session
    pub fn drain(&self) -> Vec<Arc<RelaySession>> {
        self.lock().drain().map(|(_, session)| session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::session::{ListenerHandle, SessionActivity};

    fn session(source: &str, target: &str) -> RelaySession {
        RelaySession::new(
            source.to_string(),
            target.to_string(),
            "wh".to_string(),
            Arc::new(SessionActivity::new()),
            ListenerHandle::spawn(|_| async {}),
        )
    }

    #[tokio::test]
    async fn test_one_session_per_target() {
        let registry = RelayRegistry::new();
        assert!(registry.try_insert_with("b", || session("a", "b")).is_some());

        let mut built = false;
        let second = registry.try_insert_with("b", || {
            built = true;
            session("c", "b")
        });
        assert!(second.is_none());
        assert!(!built);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("b").unwrap().source_channel_id, "a");
    }

    #[tokio::test]
    async fn test_remove_and_drain() {
        let registry = RelayRegistry::new();
        registry.try_insert_with("b", || session("a", "b"));
        registry.try_insert_with("d", || session("c", "d"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].target_channel_id, "b");

        assert!(registry.remove("b").is_some());
        assert!(registry.remove("b").is_none());
        assert!(!registry.has("b"));

        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
    }
}
