use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::{DomainError, DomainResult, Member, MemberRole};
use crate::repo::MemberRepository;

pub struct SqliteMemberRepository {
    pool: SqlitePool,
}

impl SqliteMemberRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberRepository for SqliteMemberRepository {
    async fn is_member(&self, conversation_id: &str, user_id: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM members WHERE conversation_id = ? AND user_id = ?")
                .bind(conversation_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    async fn get(&self, conversation_id: &str, user_id: &str) -> DomainResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT conversation_id, user_id, role, is_pinned, is_muted, last_read_at, joined_at
            FROM members WHERE conversation_id = ? AND user_id = ?
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    async fn list(&self, conversation_id: &str) -> DomainResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT conversation_id, user_id, role, is_pinned, is_muted, last_read_at, joined_at
            FROM members WHERE conversation_id = ?
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn list_user_ids(&self, conversation_id: &str) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT user_id FROM members WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn add(&self, conversation_id: &str, user_id: &str, role: MemberRole) -> DomainResult<()> {
        sqlx::query("INSERT INTO members (conversation_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)")
            .bind(conversation_id)
            .bind(user_id)
            .bind(role)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    DomainError::Conflict("already a member".to_string())
                }
                other => other.into(),
            })?;

        Ok(())
    }

    async fn remove(&self, conversation_id: &str, user_id: &str) -> DomainResult<()> {
        let member = self
            .get(conversation_id, user_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("membership".to_string()))?;

        if member.role == MemberRole::Owner {
            return Err(DomainError::Conflict("the group owner cannot leave or be removed".to_string()));
        }

        sqlx::query("DELETE FROM members WHERE conversation_id = ? AND user_id = ?")
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_role(&self, conversation_id: &str, user_id: &str, role: MemberRole) -> DomainResult<()> {
        sqlx::query("UPDATE members SET role = ? WHERE conversation_id = ? AND user_id = ?")
            .bind(role)
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_last_read_at(&self, conversation_id: &str, user_id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        sqlx::query("UPDATE members SET last_read_at = ? WHERE conversation_id = ? AND user_id = ?")
            .bind(at)
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_pinned(&self, conversation_id: &str, user_id: &str, pinned: bool) -> DomainResult<()> {
        sqlx::query("UPDATE members SET is_pinned = ? WHERE conversation_id = ? AND user_id = ?")
            .bind(pinned)
            .bind(conversation_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
