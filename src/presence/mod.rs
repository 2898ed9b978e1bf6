// src/presence/mod.rs
// Key/value adapter: online markers, refresh-token bindings, ephemeral
// rate-limit counters.

mod redis_store;

pub use redis_store::RedisPresenceStore;

use async_trait::async_trait;

use crate::domain::DomainResult;

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Binds `refresh:{userId}` to `token` with the given TTL, replacing
    /// any previous binding. A rotated token invalidates its predecessor
    /// because the old value is simply overwritten.
    async fn bind_refresh_token(&self, user_id: &str, token: &str, ttl_seconds: i64) -> DomainResult<()>;

    /// Returns true only if `token` is the currently bound refresh token.
    async fn check_refresh_token(&self, user_id: &str, token: &str) -> DomainResult<bool>;

    async fn revoke_refresh_token(&self, user_id: &str) -> DomainResult<()>;

    async fn mark_online(&self, user_id: &str) -> DomainResult<()>;
    async fn mark_offline(&self, user_id: &str) -> DomainResult<()>;
    async fn is_online(&self, user_id: &str) -> DomainResult<bool>;
}
