use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::{Call, CallKind, CallStatus, DomainError, DomainResult};
use crate::repo::CallRepository;

use super::new_id;

pub struct SqliteCallRepository {
    pool: SqlitePool,
}

impl SqliteCallRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_CALL: &str = r#"
    SELECT id, conversation_id, caller_id, callee_id, kind, status, started_at, ended_at, duration
    FROM calls
"#;

#[async_trait]
impl CallRepository for SqliteCallRepository {
    async fn active_call_in(&self, conversation_id: &str) -> DomainResult<Option<Call>> {
        let call = sqlx::query_as::<_, Call>(&format!(
            "{SELECT_CALL} WHERE conversation_id = ? AND status IN ('RINGING', 'ACTIVE') LIMIT 1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(call)
    }

    async fn create(&self, conversation_id: &str, caller_id: &str, callee_id: Option<&str>, kind: CallKind) -> DomainResult<Call> {
        if self.active_call_in(conversation_id).await?.is_some() {
            return Err(DomainError::Conflict("a call is already in progress in this conversation".to_string()));
        }

        let id = new_id();

        sqlx::query(
            r#"
            INSERT INTO calls (id, conversation_id, caller_id, callee_id, kind, status)
            VALUES (?, ?, ?, ?, ?, 'RINGING')
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(caller_id)
        .bind(callee_id)
        .bind(kind)
        .execute(&self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::Internal("call vanished after insert".to_string()))
    }

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Call>> {
        let call = sqlx::query_as::<_, Call>(&format!("{SELECT_CALL} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(call)
    }

    async fn set_active(&self, id: &str, started_at: DateTime<Utc>) -> DomainResult<Call> {
        sqlx::query("UPDATE calls SET status = 'ACTIVE', started_at = ? WHERE id = ? AND status = 'RINGING'")
            .bind(started_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("call {id}")))
    }

    async fn set_terminal(&self, id: &str, status: CallStatus, ended_at: DateTime<Utc>) -> DomainResult<Call> {
        let call = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("call {id}")))?;

        // duration is floor((endedAt - startedAt)/1s), zero when the call
        // never reached ACTIVE (startedAt is null).
        let duration = call.started_at.map(|started| (ended_at - started).num_seconds()).unwrap_or(0);

        sqlx::query("UPDATE calls SET status = ?, ended_at = ?, duration = ? WHERE id = ?")
            .bind(status)
            .bind(ended_at)
            .bind(duration)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("call {id}")))
    }
}
