use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{Attachment, DomainResult};
use crate::repo::AttachmentRepository;

pub struct SqliteAttachmentRepository {
    pool: SqlitePool,
}

impl SqliteAttachmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentRepository for SqliteAttachmentRepository {
    async fn create(&self, attachment: Attachment) -> DomainResult<Attachment> {
        sqlx::query(
            r#"
            INSERT INTO attachments (id, message_id, file_url, file_name, file_size, mime_type, thumbnail_url, width, height)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attachment.id)
        .bind(&attachment.message_id)
        .bind(&attachment.file_url)
        .bind(&attachment.file_name)
        .bind(attachment.file_size)
        .bind(&attachment.mime_type)
        .bind(&attachment.thumbnail_url)
        .bind(attachment.width)
        .bind(attachment.height)
        .execute(&self.pool)
        .await?;

        Ok(attachment)
    }

    async fn list_for_message(&self, message_id: &str) -> DomainResult<Vec<Attachment>> {
        let attachments = sqlx::query_as::<_, Attachment>(
            r#"
            SELECT id, message_id, file_url, file_name, file_size, mime_type, thumbnail_url, width, height
            FROM attachments WHERE message_id = ?
            "#,
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }
}
