use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::tokens::CredentialPair;
use crate::error::{AppError, StoreError};
use crate::store::KeyValueStore;

const TOKEN_PREFIX: &str = "token:";

/// Revocation records: `token:{id} -> owner`, each living as long as its token.
///
/// The record is the authority on validity. A verified token without one is rejected.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

fn token_key(id: Uuid) -> String {
    format!("{}{}", TOKEN_PREFIX, id)
}

fn remaining(expires_at: i64) -> Duration {
    let secs = expires_at - Utc::now().timestamp();
    Duration::from_secs(secs.max(1) as u64)
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Writes the access record, then the refresh record.
    ///
    /// There is no cross-key transaction: if the second write fails the first one
    /// stays behind. Callers must treat any error as a failed issuance and never
    /// hand the pair out.
    pub async fn set_token(&self, pair: &CredentialPair) -> Result<(), AppError> {
        self.backend
            .set(&token_key(pair.access_token_id), &pair.owner, Some(remaining(pair.access_expires)))
            .await?;
        self.backend
            .set(&token_key(pair.refresh_token_id), &pair.owner, Some(remaining(pair.refresh_expires)))
            .await?;
        debug!(owner = %pair.owner, access_id = %pair.access_token_id, refresh_id = %pair.refresh_token_id, "stored token pair");
        Ok(())
    }

    /// A miss, or a record owned by someone else, is `Ok(false)`.
    pub async fn has_token(&self, token_id: Uuid, owner: &str) -> Result<bool, AppError> {
        let stored = self.backend.get(&token_key(token_id)).await?;
        Ok(stored.as_deref() == Some(owner))
    }

    /// Deletes the record; an already-absent record is `StoreError::NotFound`.
    pub async fn del_token(&self, token_id: Uuid) -> Result<(), AppError> {
        if self.backend.delete(&token_key(token_id)).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound.into())
        }
    }
}
