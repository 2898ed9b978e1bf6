// src/repo/mod.rs
// Narrow repository interfaces over persistence. Each method commits (or
// participates in) one transaction; callers never see the underlying
// storage engine's error types.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Attachment, Call, CallKind, Conversation, ConversationKind, DomainResult, Member,
    MemberRole, Message, MessageType, Notification, NotificationKind, Reaction, User,
    UserWithPassword,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, email: &str, display_name: &str, password_hash: &str) -> DomainResult<User>;
    async fn find_by_email(&self, email: &str) -> DomainResult<Option<UserWithPassword>>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<User>>;
    async fn set_online(&self, id: &str, online: bool, last_seen_at: Option<DateTime<Utc>>) -> DomainResult<()>;
    async fn search(&self, query: &str, viewer_id: &str, limit: i64) -> DomainResult<Vec<User>>;
    async fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar: Option<&str>,
        status: Option<&str>,
    ) -> DomainResult<User>;
}

/// Result of a group/direct creation that may touch multiple tables in one
/// transaction (conversation + members [+ system message]).
pub struct NewGroupConversation {
    pub title: Option<String>,
    pub group_name: Option<String>,
    pub created_by_id: String,
    pub member_ids: Vec<String>,
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Finds or creates the single DIRECT conversation between two users,
    /// so repeated requests are idempotent.
    async fn find_or_create_direct(&self, a: &str, b: &str) -> DomainResult<Conversation>;

    /// Creates a GROUP conversation, its Members (creator as OWNER), and a
    /// SYSTEM message, all in a single transaction.
    async fn create_group(&self, req: NewGroupConversation) -> DomainResult<Conversation>;

    /// Creates an AI_CHAT conversation with exactly one human member.
    async fn create_ai_chat(
        &self,
        owner_id: &str,
        title: Option<String>,
        system_prompt: Option<String>,
    ) -> DomainResult<Conversation>;

    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Conversation>>;
    async fn touch_updated_at(&self, id: &str) -> DomainResult<()>;
    async fn set_title(&self, id: &str, title: &str) -> DomainResult<()>;
    async fn kind_of(&self, id: &str) -> DomainResult<Option<ConversationKind>>;
}

#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn is_member(&self, conversation_id: &str, user_id: &str) -> DomainResult<bool>;
    async fn get(&self, conversation_id: &str, user_id: &str) -> DomainResult<Option<Member>>;
    async fn list(&self, conversation_id: &str) -> DomainResult<Vec<Member>>;
    async fn list_user_ids(&self, conversation_id: &str) -> DomainResult<Vec<String>>;
    async fn add(&self, conversation_id: &str, user_id: &str, role: MemberRole) -> DomainResult<()>;

    /// Removing the OWNER of a GROUP is forbidden; the implementation
    /// returns `DomainError::Conflict` in that case.
    async fn remove(&self, conversation_id: &str, user_id: &str) -> DomainResult<()>;

    async fn set_role(&self, conversation_id: &str, user_id: &str, role: MemberRole) -> DomainResult<()>;
    async fn set_last_read_at(&self, conversation_id: &str, user_id: &str, at: DateTime<Utc>) -> DomainResult<()>;
    async fn set_pinned(&self, conversation_id: &str, user_id: &str, pinned: bool) -> DomainResult<()>;
}

pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: Option<String>,
    pub kind: MessageType,
    pub content: String,
    pub reply_to_id: Option<String>,
    pub token_count: i64,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, msg: NewMessage) -> DomainResult<Message>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Message>>;

    /// The last `limit` non-deleted messages of type TEXT or AI_RESPONSE,
    /// ascending by createdAt (tie-broken by id). Filtering happens before
    /// the limit is applied, so other message types never crowd out
    /// eligible history.
    async fn list_for_context(&self, conversation_id: &str, limit: i64) -> DomainResult<Vec<Message>>;

    async fn edit(&self, id: &str, new_content: &str) -> DomainResult<Message>;

    /// Cascade-deletes every message with `createdAt > target.createdAt` in
    /// the same conversation, in the same transaction as the edit itself.
    async fn edit_ai_chat_cascading(&self, id: &str, new_content: &str) -> DomainResult<(Message, Vec<Message>)>;

    async fn soft_delete(&self, id: &str) -> DomainResult<Message>;
    async fn mark_all_read(&self, conversation_id: &str, reader_id: &str) -> DomainResult<()>;
    /// Persists with a fresh, DB-assigned id distinct from the streaming
    /// placeholder id used for `ai-stream-start`/`ai-stream-chunk` (spec
    /// §4.6: "using a fresh DB-assigned id").
    async fn persist_ai_response(&self, conversation_id: &str, content: &str, token_count: i64) -> DomainResult<Message>;
    async fn delete(&self, id: &str) -> DomainResult<()>;
    async fn most_recent_ai_response(&self, conversation_id: &str) -> DomainResult<Option<Message>>;
    async fn most_recent_text_from(&self, conversation_id: &str, user_id: &str) -> DomainResult<Option<Message>>;
}

#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    async fn create(&self, attachment: Attachment) -> DomainResult<Attachment>;
    async fn list_for_message(&self, message_id: &str) -> DomainResult<Vec<Attachment>>;
}

#[async_trait]
pub trait ReactionRepository: Send + Sync {
    /// Toggle semantics: a second call with the same tuple removes it.
    /// Returns the full reaction set for the message after the toggle.
    async fn toggle(&self, message_id: &str, user_id: &str, emoji: &str) -> DomainResult<Vec<Reaction>>;
    async fn list_for_message(&self, message_id: &str) -> DomainResult<Vec<Reaction>>;
}

#[async_trait]
pub trait CallRepository: Send + Sync {
    async fn active_call_in(&self, conversation_id: &str) -> DomainResult<Option<Call>>;
    async fn create(&self, conversation_id: &str, caller_id: &str, callee_id: Option<&str>, kind: CallKind) -> DomainResult<Call>;
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Call>>;
    async fn set_active(&self, id: &str, started_at: DateTime<Utc>) -> DomainResult<Call>;
    async fn set_terminal(&self, id: &str, status: crate::domain::CallStatus, ended_at: DateTime<Utc>) -> DomainResult<Call>;
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    async fn is_blocked(&self, a: &str, b: &str) -> DomainResult<bool>;
    async fn block(&self, blocker_id: &str, blocked_id: &str) -> DomainResult<()>;
    async fn unblock(&self, blocker_id: &str, blocked_id: &str) -> DomainResult<()>;
    async fn list_blocked(&self, blocker_id: &str) -> DomainResult<Vec<String>>;
}

pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, n: NewNotification) -> DomainResult<Notification>;
    async fn mark_read(&self, id: &str, user_id: &str) -> DomainResult<()>;
    async fn mark_all_read(&self, user_id: &str) -> DomainResult<()>;
    async fn list_unread(&self, user_id: &str) -> DomainResult<Vec<Notification>>;
}
