use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::KeyValueStore;

const ONLINE_PREFIX: &str = "online:";

/// Durable "currently connected" records for clients.
#[async_trait]
pub trait PresenceTracker: Send + Sync {
    async fn set_online(&self, client_id: &str, connection_id: Uuid) -> Result<(), StoreError>;
    async fn set_offline(&self, client_id: &str) -> Result<(), StoreError>;
}

/// Keeps `online:{client} -> connection id` in the key-value store.
#[derive(Clone)]
pub struct StorePresence {
    backend: Arc<dyn KeyValueStore>,
}

impl StorePresence {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub async fn is_online(&self, client_id: &str) -> Result<bool, StoreError> {
        Ok(self.backend.get(&format!("{}{}", ONLINE_PREFIX, client_id)).await?.is_some())
    }
}

#[async_trait]
impl PresenceTracker for StorePresence {
    async fn set_online(&self, client_id: &str, connection_id: Uuid) -> Result<(), StoreError> {
        self.backend
            .set(&format!("{}{}", ONLINE_PREFIX, client_id), &connection_id.to_string(), None)
            .await
    }

    async fn set_offline(&self, client_id: &str) -> Result<(), StoreError> {
        self.backend.delete(&format!("{}{}", ONLINE_PREFIX, client_id)).await?;
        Ok(())
    }
}
