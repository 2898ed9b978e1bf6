use serde::{Deserialize, Serialize};

use super::helpers::{env_or, env_usize, require_env, try_require_env};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_usize("PORT", 8080) as u16,
            frontend_url: env_or("FRONTEND_URL", "http://localhost:3000"),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_or("DATABASE_URL", "sqlite://chat.db"),
            max_connections: env_usize("SQLITE_MAX_CONNECTIONS", 10) as u32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub kv_url: String,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self { kv_url: require_env("KV_URL") }
    }

    pub fn try_from_env() -> Result<Self, String> {
        Ok(Self { kv_url: try_require_env("KV_URL")? })
    }
}
