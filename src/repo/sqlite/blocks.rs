use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::DomainResult;
use crate::repo::BlockRepository;

use super::now;

pub struct SqliteBlockRepository {
    pool: SqlitePool,
}

impl SqliteBlockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockRepository for SqliteBlockRepository {
    async fn is_blocked(&self, a: &str, b: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM blocks WHERE (blocker_id = ? AND blocked_id = ?) OR (blocker_id = ? AND blocked_id = ?)",
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn block(&self, blocker_id: &str, blocked_id: &str) -> DomainResult<()> {
        sqlx::query("INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)")
            .bind(blocker_id)
            .bind(blocked_id)
            .bind(now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn unblock(&self, blocker_id: &str, blocked_id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM blocks WHERE blocker_id = ? AND blocked_id = ?")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_blocked(&self, blocker_id: &str) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT blocked_id FROM blocks WHERE blocker_id = ?")
            .bind(blocker_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
