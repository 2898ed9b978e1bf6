use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::{Conversation, ConversationKind, DomainError, DomainResult, MemberRole};
use crate::repo::{ConversationRepository, NewGroupConversation};

use super::{new_id, now};

pub struct SqliteConversationRepository {
    pool: SqlitePool,
}

impl SqliteConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

#[async_trait]
impl ConversationRepository for SqliteConversationRepository {
    async fn find_or_create_direct(&self, a: &str, b: &str) -> DomainResult<Conversation> {
        let (low, high) = ordered_pair(a, b);

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT conversation_id FROM direct_conversation_pairs WHERE user_low = ? AND user_high = ?")
                .bind(low)
                .bind(high)
                .fetch_optional(&self.pool)
                .await?;

        if let Some((conversation_id,)) = existing {
            return self
                .find_by_id(&conversation_id)
                .await?
                .ok_or_else(|| DomainError::Internal("direct conversation row missing".to_string()));
        }

        let id = new_id();
        let now = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, created_by_id, created_at, updated_at)
            VALUES (?, 'DIRECT', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(a)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO direct_conversation_pairs (conversation_id, user_low, user_high) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(low)
            .bind(high)
            .execute(&mut *tx)
            .await?;

        for member in [a, b] {
            sqlx::query(
                "INSERT INTO members (conversation_id, user_id, role, joined_at) VALUES (?, ?, 'MEMBER', ?)",
            )
            .bind(&id)
            .bind(member)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::Internal("direct conversation vanished after insert".to_string()))
    }

    async fn create_group(&self, req: NewGroupConversation) -> DomainResult<Conversation> {
        if req.member_ids.len() < 2 {
            return Err(DomainError::Validation("a group needs at least two members".to_string()));
        }

        let id = new_id();
        let now = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, title, group_name, created_by_id, created_at, updated_at)
            VALUES (?, 'GROUP', ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&req.title)
        .bind(&req.group_name)
        .bind(&req.created_by_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for member_id in &req.member_ids {
            let role = if member_id == &req.created_by_id { MemberRole::Owner } else { MemberRole::Member };
            sqlx::query("INSERT INTO members (conversation_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)")
                .bind(&id)
                .bind(member_id)
                .bind(role)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        let system_message_id = new_id();
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, type, content, status, created_at)
            VALUES (?, ?, NULL, 'SYSTEM', ?, 'SENT', ?)
            "#,
        )
        .bind(&system_message_id)
        .bind(&id)
        .bind(format!("{} created the group", req.group_name.as_deref().unwrap_or("someone")))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::Internal("group conversation vanished after insert".to_string()))
    }

    async fn create_ai_chat(
        &self,
        owner_id: &str,
        title: Option<String>,
        system_prompt: Option<String>,
    ) -> DomainResult<Conversation> {
        let id = new_id();
        let now = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, title, system_prompt, created_by_id, created_at, updated_at)
            VALUES (?, 'AI_CHAT', ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&title)
        .bind(&system_prompt)
        .bind(owner_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO members (conversation_id, user_id, role, joined_at) VALUES (?, ?, 'OWNER', ?)")
            .bind(&id)
            .bind(owner_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::Internal("ai chat conversation vanished after insert".to_string()))
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT id, kind, title, group_name, description, system_prompt, created_by_id,
                   created_at, updated_at
            FROM conversations WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn touch_updated_at(&self, id: &str) -> DomainResult<()> {
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_title(&self, id: &str, title: &str) -> DomainResult<()> {
        sqlx::query("UPDATE conversations SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn kind_of(&self, id: &str) -> DomainResult<Option<ConversationKind>> {
        let row: Option<(ConversationKind,)> = sqlx::query_as("SELECT kind FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(kind,)| kind))
    }
}
