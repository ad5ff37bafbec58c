//! Shared key/value context for inter-agent communication.
//!
//! Handlers receive a clone of the orchestrator's `SharedContext` and can
//! publish values for later tasks. Entries may carry a TTL; expired
//! entries are dropped lazily when read.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    stored_at: Instant,
    ttl: Option<Duration>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(self.stored_at) > ttl)
    }
}

/// Cloneable handle to the shared context store.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Read a value, removing it if its TTL has passed.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    pub async fn remove(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().await;
        entries.remove(key).map(|e| e.value)
    }

    /// Number of stored entries, expired ones included until read.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
