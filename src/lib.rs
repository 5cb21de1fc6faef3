pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod store;

use std::sync::Arc;
use actix_web::{web, HttpResponse, Scope};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

use auth::{AuthGate, TokenIssuer, TokenStore, UserStore};
use hub::{EventHub, StorePresence};
use store::KeyValueStore;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub issuer: Arc<TokenIssuer>,
    pub tokens: TokenStore,
    pub users: UserStore,
    pub gate: AuthGate,
    pub hub: EventHub,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let backend = store::connect(&config.store).await?;
        Ok(Self::with_store(config, backend))
    }

    /// Wires every component over `backend` and starts the event hub.
    /// Must be called inside a tokio runtime.
    pub fn with_store(config: Settings, backend: Arc<dyn KeyValueStore>) -> Self {
        let issuer = Arc::new(TokenIssuer::new(&config.auth));
        let tokens = TokenStore::new(backend.clone());
        let users = UserStore::new(backend.clone());
        let gate = AuthGate::new(issuer.clone(), tokens.clone());
        let hub = EventHub::start(&config.hub, Arc::new(StorePresence::new(backend)));

        Self {
            config: Arc::new(config),
            issuer,
            tokens,
            users,
            gate,
            hub,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.hub.stop().await;
        Ok(())
    }
}

/// Every API route, mounted under `prefix`.
pub fn api_scope(prefix: &str) -> Scope {
    web::scope(prefix.trim_end_matches('/'))
        .route("/auth/register", web::post().to(auth::handlers::register))
        .route("/auth/login", web::post().to(auth::handlers::login))
        .route("/auth/logout", web::post().to(auth::handlers::logout))
        .route("/auth/refresh_token", web::post().to(auth::handlers::refresh_token))
        .route("/notifications/stream", web::get().to(hub::handlers::stream))
        .route("/notifications/send", web::post().to(hub::handlers::send))
}
