//! Key-value backend for the session and presence records.
//!
//! Everything durable in this server is a short string under a namespaced key,
//! optionally with a TTL. Expiry is left entirely to the backend.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreError;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value`, replacing any previous one. `None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Writes `value` only if `key` is absent. Returns whether it was written.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Removes `key`. Returns `true` iff this call removed a live entry.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(config.key_prefix.clone())),
        StoreBackend::Redis => {
            Arc::new(RedisStore::connect(&config.url, config.key_prefix.clone()).await?)
        }
    };
    Ok(store)
}
