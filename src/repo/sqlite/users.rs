use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{DomainError, DomainResult, User, UserWithPassword};
use crate::repo::UserRepository;

use super::{new_id, now};

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, email: &str, display_name: &str, password_hash: &str) -> DomainResult<User> {
        let id = new_id();
        let now = now();
        let email = email.trim().to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, password_hash, online, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&email)
        .bind(display_name)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DomainError::Conflict("email already registered".to_string())
            }
            other => other.into(),
        })?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::Internal("user vanished after insert".to_string()))
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Option<UserWithPassword>> {
        let email = email.trim().to_lowercase();

        let user = sqlx::query_as::<_, UserWithPassword>(
            r#"
            SELECT id, email, display_name, avatar, bio, status, online, last_seen_at,
                   created_at, updated_at, password_hash
            FROM users WHERE email = ?
            "#,
        )
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, display_name, avatar, bio, status, online, last_seen_at,
                   created_at, updated_at
            FROM users WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_online(&self, id: &str, online: bool, last_seen_at: Option<chrono::DateTime<chrono::Utc>>) -> DomainResult<()> {
        sqlx::query("UPDATE users SET online = ?, last_seen_at = ?, updated_at = ? WHERE id = ?")
            .bind(online)
            .bind(last_seen_at)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn search(&self, query: &str, viewer_id: &str, limit: i64) -> DomainResult<Vec<User>> {
        let pattern = format!("%{query}%");

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, display_name, avatar, bio, status, online, last_seen_at,
                   created_at, updated_at
            FROM users
            WHERE id != ? AND (display_name LIKE ? OR email LIKE ?)
            ORDER BY display_name
            LIMIT ?
            "#,
        )
        .bind(viewer_id)
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar: Option<&str>,
        status: Option<&str>,
    ) -> DomainResult<User> {
        let current = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {id}")))?;

        sqlx::query(
            r#"
            UPDATE users
            SET display_name = ?, bio = ?, avatar = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(display_name.unwrap_or(&current.display_name))
        .bind(bio.or(current.bio.as_deref()))
        .bind(avatar.or(current.avatar.as_deref()))
        .bind(status.or(current.status.as_deref()))
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {id}")))
    }
}
