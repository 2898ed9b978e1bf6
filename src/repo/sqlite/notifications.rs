use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{DomainResult, Notification};
use crate::repo::{NewNotification, NotificationRepository};

use super::{new_id, now};

pub struct SqliteNotificationRepository {
    pool: SqlitePool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn create(&self, n: NewNotification) -> DomainResult<Notification> {
        let id = new_id();
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, body, data, is_read, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&n.user_id)
        .bind(n.kind)
        .bind(&n.title)
        .bind(&n.body)
        .bind(&n.data)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let notification = sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, kind, title, body, data, is_read, created_at FROM notifications WHERE id = ?",
        )
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;

        Ok(notification)
    }

    async fn mark_read(&self, id: &str, user_id: &str) -> DomainResult<()> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> DomainResult<()> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_unread(&self, user_id: &str) -> DomainResult<Vec<Notification>> {
        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, kind, title, body, data, is_read, created_at
            FROM notifications WHERE user_id = ? AND is_read = 0
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }
}
