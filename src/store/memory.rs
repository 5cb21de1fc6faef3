use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::KeyValueStore;
use crate::error::StoreError;

/// Writes between sweeps of expired entries.
const SWEEP_INTERVAL: usize = 256;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Single-process store. Expired entries are dropped when touched, and swept
/// out on every `SWEEP_INTERVAL`th write.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    writes: Arc<AtomicUsize>,
    key_prefix: String,
}

impl MemoryStore {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            writes: Arc::new(AtomicUsize::new(0)),
            key_prefix: key_prefix.into(),
        }
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Drops expired entries if this write is due for a sweep.
    fn maybe_sweep(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_INTERVAL != 0 {
            return;
        }
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        if entries.len() < before {
            debug!(swept = before - entries.len(), remaining = entries.len(), "swept expired entries");
        }
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| e.is_live(now)).count()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = self.prefixed_key(key);
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // expired: evict, unless it was rewritten in the meantime
        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(&key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut entries = self.entries.write().await;
        self.maybe_sweep(&mut entries, now);
        entries.insert(self.prefixed_key(key), entry);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let key = self.prefixed_key(key);
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        self.maybe_sweep(&mut entries, now);
        if entries.get(&key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key, Entry { value: value.to_string(), expires_at: None });
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.entries.write().await.remove(&self.prefixed_key(key));
        Ok(removed.is_some_and(|e| e.is_live(Instant::now())))
    }
}
