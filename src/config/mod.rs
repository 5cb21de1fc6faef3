use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
    /// Prefix for every API route; also the `Path` of the session cookies.
    pub api_prefix: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub key_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub access_secret: String,
    pub refresh_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    pub queue_capacity: usize,
    pub mailbox_capacity: usize,
    pub drain_delay_ms: u64,
    pub keepalive_secs: u64,
}

impl HubConfig {
    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub hub: HubConfig,
    pub cors: CorsConfig,
}

fn with_defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("environment", environment)?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("server.api_prefix", "/api")?
        .set_default("store.backend", "memory")?
        .set_default("store.url", "redis://127.0.0.1:6379")?
        .set_default("store.key_prefix", "watchparty:")?
        .set_default("auth.access_secret", "development_access_secret")?
        .set_default("auth.refresh_secret", "development_refresh_secret")?
        .set_default("hub.queue_capacity", 256)?
        .set_default("hub.mailbox_capacity", 32)?
        .set_default("hub.drain_delay_ms", 500)?
        .set_default("hub.keepalive_secs", 15)?
        .set_default("cors.enabled", true)?
        .set_default("cors.allowed_origins", Vec::<String>::new())?
        .set_default("cors.max_age", 3600)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings: Settings = with_defaults("development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// In-memory configuration with fixed secrets and no environment overrides.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        let settings: Settings = with_defaults("test")?
            .set_override("auth.access_secret", "test_access_secret")?
            .set_override("auth.refresh_secret", "test_refresh_secret")?
            .set_override("hub.drain_delay_ms", 50)?
            .set_override("hub.keepalive_secs", 300)?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the server must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.access_secret.is_empty() || self.auth.refresh_secret.is_empty() {
            return Err(ConfigError::Message("signing secrets must not be empty".into()));
        }
        if self.auth.access_secret == self.auth.refresh_secret {
            return Err(ConfigError::Message(
                "access and refresh signing secrets must differ".into(),
            ));
        }
        if !self.server.api_prefix.starts_with('/') {
            return Err(ConfigError::Message("server.api_prefix must start with '/'".into()));
        }
        if self.hub.queue_capacity == 0 || self.hub.mailbox_capacity == 0 {
            return Err(ConfigError::Message("hub capacities must be non-zero".into()));
        }
        Ok(())
    }
}
