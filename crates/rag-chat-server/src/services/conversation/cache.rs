use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::types::SessionState;

/// Shared handle to one session's state. The async mutex serializes
/// queries of the same session while other sessions proceed.
pub type SessionHandle = Arc<Mutex<SessionState>>;

/// Thread-safe registry of live sessions: session_id -> state
#[derive(Clone)]
pub struct SessionRegistry {
    storage: Arc<DashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        info!("Initializing session registry with DashMap");
        Self {
            storage: Arc::new(DashMap::new()),
        }
    }

    /// Get the session's handle, creating it exactly once on first use.
    ///
    /// Returns the handle and whether this call created it. The shard lock
    /// is released before returning, so callers may await on the handle.
    pub fn get_or_create<F>(&self, session_id: &str, init: F) -> (SessionHandle, bool)
    where
        F: FnOnce() -> SessionState,
    {
        match self.storage.entry(session_id.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = Arc::new(Mutex::new(init()));
                entry.insert(handle.clone());
                debug!("Created session {} in registry", session_id);
                (handle, true)
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.storage.get(session_id).map(|entry| entry.value().clone())
    }

    /// Remove the session; its memory, transcript and binding go with it.
    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.storage.remove(session_id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.storage.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_sessions: self.len(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub active_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::memory::{MemoryProvider, TokenBufferMemoryProvider};

    fn fresh(id: &str) -> SessionState {
        SessionState::new(id.to_string(), TokenBufferMemoryProvider::default().create())
    }

    #[test]
    fn test_registry_basic_operations() {
        let registry = SessionRegistry::new();

        let (_, created) = registry.get_or_create("s1", || fresh("s1"));
        assert!(created);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("s1").is_some());

        assert!(registry.remove("s1").is_some());
        assert!(registry.is_empty());
        assert!(registry.remove("s1").is_none());
    }

    #[test]
    fn test_get_or_create_returns_same_handle() {
        let registry = SessionRegistry::new();
        let (first, created_first) = registry.get_or_create("s1", || fresh("s1"));
        let (second, created_second) =
            registry.get_or_create("s1", || panic!("must not re-create"));

        assert!(created_first);
        assert!(!created_second);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_creates_once() {
        let registry = SessionRegistry::new();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("shared", || fresh("shared")) })
            })
            .collect();

        let mut handles = Vec::new();
        let mut creations = 0;
        for task in tasks {
            let (handle, created) = task.await.unwrap();
            if created {
                creations += 1;
            }
            handles.push(handle);
        }

        assert_eq!(creations, 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.stats().active_sessions, 1);
    }
}
