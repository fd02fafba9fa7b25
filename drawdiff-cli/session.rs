//! Session bookkeeping for callers that hold uploaded document pairs.
//!
//! The comparison engine itself is session-free; whatever is serving it
//! injects a [`SessionStore`] and sweeps it on its own schedule.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),
}

/// Metadata for one uploaded document pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub reference_path: PathBuf,
    pub target_path: PathBuf,
    pub reference_pages: usize,
    pub target_pages: usize,
}

/// Key-value session storage with TTL-based eviction.
///
/// `get` does not check age; stale entries linger until the owner calls
/// [`SessionStore::evict_expired`], typically from a periodic sweep.
pub trait SessionStore: Send + Sync {
    fn put(&self, key: &str, data: SessionData);
    fn get(&self, key: &str) -> Result<SessionData, SessionError>;
    fn delete(&self, key: &str) -> Result<(), SessionError>;
    fn list(&self) -> Vec<String>;
    /// Drop sessions older than the store's TTL, returning how many went.
    fn evict_expired(&self) -> usize;
}

struct Entry {
    data: SessionData,
    created: Instant,
}

/// In-memory store guarded by a read-write lock.
pub struct InMemorySessionStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionStore for InMemorySessionStore {
    fn put(&self, key: &str, data: SessionData) {
        let mut entries = self.entries.write().expect("session lock poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                data,
                created: Instant::now(),
            },
        );
    }

    fn get(&self, key: &str) -> Result<SessionData, SessionError> {
        let entries = self.entries.read().expect("session lock poisoned");
        entries
            .get(key)
            .map(|entry| entry.data.clone())
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), SessionError> {
        let mut entries = self.entries.write().expect("session lock poisoned");
        entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| SessionError::NotFound(key.to_string()))
    }

    fn list(&self) -> Vec<String> {
        let entries = self.entries.read().expect("session lock poisoned");
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().expect("session lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.created.elapsed() < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "expired sessions dropped");
        }
        evicted
    }
}
