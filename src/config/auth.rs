use serde::{Deserialize, Serialize};

use super::helpers::{env_usize, require_env, try_require_env};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            access_token_secret: require_env("JWT_SECRET"),
            refresh_token_secret: require_env("JWT_REFRESH_SECRET"),
            access_token_ttl_seconds: 15 * 60,
            refresh_token_ttl_seconds: 7 * 24 * 60 * 60,
            bcrypt_cost: env_usize("BCRYPT_COST", 12) as u32,
        }
    }

    pub fn try_from_env() -> Result<Self, String> {
        Ok(Self {
            access_token_secret: try_require_env("JWT_SECRET")?,
            refresh_token_secret: try_require_env("JWT_REFRESH_SECRET")?,
            access_token_ttl_seconds: 15 * 60,
            refresh_token_ttl_seconds: 7 * 24 * 60 * 60,
            bcrypt_cost: env_usize("BCRYPT_COST", 12) as u32,
        })
    }
}
