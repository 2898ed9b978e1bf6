use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::DomainResult;

use super::PresenceStore;

pub struct RedisPresenceStore {
    conn: ConnectionManager,
}

impl RedisPresenceStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn refresh_key(user_id: &str) -> String {
        format!("refresh:{user_id}")
    }

    fn online_key(user_id: &str) -> String {
        format!("online:{user_id}")
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn bind_refresh_token(&self, user_id: &str, token: &str, ttl_seconds: i64) -> DomainResult<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::refresh_key(user_id), token, ttl_seconds as u64).await?;
        Ok(())
    }

    async fn check_refresh_token(&self, user_id: &str, token: &str) -> DomainResult<bool> {
        let mut conn = self.conn.clone();
        let stored: Option<String> = conn.get(Self::refresh_key(user_id)).await?;
        Ok(stored.as_deref() == Some(token))
    }

    async fn revoke_refresh_token(&self, user_id: &str) -> DomainResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::refresh_key(user_id)).await?;
        Ok(())
    }

    async fn mark_online(&self, user_id: &str) -> DomainResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::online_key(user_id), "1").await?;
        Ok(())
    }

    async fn mark_offline(&self, user_id: &str) -> DomainResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::online_key(user_id)).await?;
        Ok(())
    }

    async fn is_online(&self, user_id: &str) -> DomainResult<bool> {
        let mut conn = self.conn.clone();
        let present: bool = conn.exists(Self::online_key(user_id)).await?;
        Ok(present)
    }
}
