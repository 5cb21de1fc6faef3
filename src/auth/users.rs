use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AuthError};
use crate::store::KeyValueStore;

const USER_PREFIX: &str = "user:";
const MAX_USERNAME_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;

/// Account records: `user:{name} -> argon2id PHC string`.
#[derive(Clone)]
pub struct UserStore {
    backend: Arc<dyn KeyValueStore>,
}

impl UserStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<(), AppError> {
        validate(username, password)?;

        let hash = hash_password(password.to_string()).await?;
        let key = format!("{}{}", USER_PREFIX, username);
        if !self.backend.set_nx(&key, &hash).await? {
            return Err(AppError::Conflict(format!("username {} is taken", username)));
        }
        info!(owner = %username, "registered user");
        Ok(())
    }

    /// Unknown user and wrong password fail identically.
    pub async fn verify(&self, username: &str, password: &str) -> Result<(), AppError> {
        let key = format!("{}{}", USER_PREFIX, username);
        let hash = self
            .backend
            .get(&key)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if verify_password(password.to_string(), hash).await? {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials.into())
        }
    }
}

fn validate(username: &str, password: &str) -> Result<(), AppError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(AppError::ValidationError(format!(
            "username must be 1-{} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AppError::ValidationError("username must not contain whitespace".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::ValidationError(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::InternalError(format!("password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?
}

async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| AppError::InternalError(format!("stored hash is invalid: {}", e)))?;
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::InternalError(format!("password verification failed: {}", e))),
        }
    })
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?
}
