use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{DomainResult, Reaction};
use crate::repo::ReactionRepository;

pub struct SqliteReactionRepository {
    pool: SqlitePool,
}

impl SqliteReactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReactionRepository for SqliteReactionRepository {
    async fn toggle(&self, message_id: &str, user_id: &str, emoji: &str) -> DomainResult<Vec<Reaction>> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT message_id FROM reactions WHERE message_id = ? AND user_id = ? AND emoji = ?")
                .bind(message_id)
                .bind(user_id)
                .bind(emoji)
                .fetch_optional(&self.pool)
                .await?;

        if existing.is_some() {
            sqlx::query("DELETE FROM reactions WHERE message_id = ? AND user_id = ? AND emoji = ?")
                .bind(message_id)
                .bind(user_id)
                .bind(emoji)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("INSERT INTO reactions (message_id, user_id, emoji) VALUES (?, ?, ?)")
                .bind(message_id)
                .bind(user_id)
                .bind(emoji)
                .execute(&self.pool)
                .await?;
        }

        self.list_for_message(message_id).await
    }

    async fn list_for_message(&self, message_id: &str) -> DomainResult<Vec<Reaction>> {
        let reactions = sqlx::query_as::<_, Reaction>("SELECT message_id, user_id, emoji FROM reactions WHERE message_id = ?")
            .bind(message_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(reactions)
    }
}
