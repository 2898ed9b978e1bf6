use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{DomainError, DomainResult, Message, MessageType};
use crate::repo::{MessageRepository, NewMessage};

use super::{new_id, now};

pub struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_MESSAGE: &str = r#"
    SELECT id, conversation_id, sender_id, type, content, status, reply_to_id,
           is_edited, is_deleted, deleted_at, token_count, created_at
    FROM messages
"#;

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn create(&self, msg: NewMessage) -> DomainResult<Message> {
        let id = new_id();
        let now = now();

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, type, content, status, reply_to_id, token_count, created_at)
            VALUES (?, ?, ?, ?, ?, 'SENT', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&msg.conversation_id)
        .bind(&msg.sender_id)
        .bind(msg.kind)
        .bind(&msg.content)
        .bind(&msg.reply_to_id)
        .bind(msg.token_count)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::Internal("message vanished after insert".to_string()))
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!("{SELECT_MESSAGE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(message)
    }

    async fn list_for_context(&self, conversation_id: &str, limit: i64) -> DomainResult<Vec<Message>> {
        let mut messages = sqlx::query_as::<_, Message>(&format!(
            "{SELECT_MESSAGE} WHERE conversation_id = ? AND is_deleted = 0 AND type IN ('TEXT', 'AI_RESPONSE') ORDER BY created_at DESC, id DESC LIMIT ?"
        ))
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        messages.reverse();
        Ok(messages)
    }

    async fn edit(&self, id: &str, new_content: &str) -> DomainResult<Message> {
        sqlx::query("UPDATE messages SET content = ?, is_edited = 1 WHERE id = ? AND is_deleted = 0")
            .bind(new_content)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("message {id}")))
    }

    async fn edit_ai_chat_cascading(&self, id: &str, new_content: &str) -> DomainResult<(Message, Vec<Message>)> {
        let mut tx = self.pool.begin().await?;

        let target = sqlx::query_as::<_, Message>(&format!("{SELECT_MESSAGE} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("message {id}")))?;

        let dropped = sqlx::query_as::<_, Message>(&format!(
            "{SELECT_MESSAGE} WHERE conversation_id = ? AND created_at > ? ORDER BY created_at ASC"
        ))
        .bind(&target.conversation_id)
        .bind(target.created_at)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ? AND created_at > ?")
            .bind(&target.conversation_id)
            .bind(target.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE messages SET content = ?, is_edited = 1 WHERE id = ?")
            .bind(new_content)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let edited = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::Internal("message vanished after cascading edit".to_string()))?;

        Ok((edited, dropped))
    }

    async fn soft_delete(&self, id: &str) -> DomainResult<Message> {
        sqlx::query("UPDATE messages SET is_deleted = 1, deleted_at = ?, content = '' WHERE id = ?")
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("message {id}")))
    }

    async fn mark_all_read(&self, conversation_id: &str, reader_id: &str) -> DomainResult<()> {
        sqlx::query(
            r#"
            UPDATE messages SET status = 'READ'
            WHERE conversation_id = ? AND status != 'READ' AND (sender_id IS NULL OR sender_id != ?)
            "#,
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn persist_ai_response(&self, conversation_id: &str, content: &str, token_count: i64) -> DomainResult<Message> {
        let id = new_id();

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, type, content, status, token_count, created_at)
            VALUES (?, ?, NULL, 'AI_RESPONSE', ?, 'SENT', ?, ?)
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(content)
        .bind(token_count)
        .bind(now())
        .execute(&self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::Internal("ai response vanished after insert".to_string()))
    }

    async fn delete(&self, id: &str) -> DomainResult<()> {
        sqlx::query("DELETE FROM messages WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn most_recent_ai_response(&self, conversation_id: &str) -> DomainResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "{SELECT_MESSAGE} WHERE conversation_id = ? AND type = 'AI_RESPONSE' ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn most_recent_text_from(&self, conversation_id: &str, user_id: &str) -> DomainResult<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "{SELECT_MESSAGE} WHERE conversation_id = ? AND sender_id = ? AND type = ? ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(conversation_id)
        .bind(user_id)
        .bind(MessageType::Text)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }
}
