// src/config/mod.rs
// Central configuration, composed from narrow per-domain sub-configs.

pub mod ai;
pub mod auth;
pub mod helpers;
pub mod realtime;
pub mod server;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub auth: auth::AuthConfig,
    pub server: server::ServerConfig,
    pub database: server::DatabaseConfig,
    pub storage: server::StorageConfig,
    pub ai: ai::AiConfig,
    pub realtime: realtime::RealtimeConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible counterpart used by `main`, so a missing required
    /// environment variable (`JWT_SECRET`, `JWT_REFRESH_SECRET`, `KV_URL`,
    /// ...) surfaces as a bootstrap error and an exit code of 1 rather
    /// than an unwinding panic.
    pub fn try_from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let config = Self {
            auth: auth::AuthConfig::try_from_env()?,
            server: server::ServerConfig::from_env(),
            database: server::DatabaseConfig::from_env(),
            storage: server::StorageConfig::try_from_env()?,
            ai: ai::AiConfig::from_env(),
            realtime: realtime::RealtimeConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects signing secrets shorter than 32 characters.
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.access_token_secret.len() < 32 {
            return Err("JWT_SECRET must be at least 32 characters".to_string());
        }
        if self.auth.refresh_token_secret.len() < 32 {
            return Err("JWT_REFRESH_SECRET must be at least 32 characters".to_string());
        }
        Ok(())
    }
}
