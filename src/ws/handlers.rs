// src/ws/handlers.rs
// Chat event handlers plus the dispatch table for every other inbound
// event (join/leave, calls, WebRTC relay, AI control): one `Handlers`
// struct bound to a single connection, one method per inbound event,
// persist-then-broadcast throughout.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::domain::{DomainError, DomainResult, MessageType, NotificationKind};
use crate::registry::conversation_room;
use crate::repo::NewMessage;
use crate::state::AppState;

use super::connection::WebSocketConnection;
use super::events::{WsClientEvent, WsServerEvent};

const MAX_MESSAGE_CHARS: usize = 10_000;
const NEW_CHAT_TITLE: &str = "New Chat";
const AI_MENTION_TRIGGER: &str = "@ai";
const AI_SLASH_TRIGGER: &str = "/ai ";

pub struct Handlers {
    state: Arc<AppState>,
    connection: Arc<WebSocketConnection>,
    connection_id: String,
    user_id: String,
}

impl Handlers {
    pub fn new(state: Arc<AppState>, connection: Arc<WebSocketConnection>, connection_id: String, user_id: String) -> Self {
        Self { state, connection, connection_id, user_id }
    }

    /// Top-level dispatch. Unknown events never reach here —
    /// they are rejected at decode time by `WsClientEvent`'s closed sum
    /// type — so this match is exhaustive over the known catalog.
    pub async fn dispatch(&self, event: WsClientEvent) -> DomainResult<()> {
        match event {
            WsClientEvent::JoinConversation { conversation_id } => self.join_conversation(&conversation_id).await,
            WsClientEvent::LeaveConversation { conversation_id } => self.leave_conversation(&conversation_id).await,
            WsClientEvent::SendMessage { conversation_id, content, r#type, reply_to_id } => {
                self.send_message(&conversation_id, content, r#type.unwrap_or(MessageType::Text), reply_to_id).await
            }
            WsClientEvent::TypingStart { conversation_id } => self.typing(&conversation_id, true).await,
            WsClientEvent::TypingStop { conversation_id } => self.typing(&conversation_id, false).await,
            WsClientEvent::EditMessage { message_id, content } => self.edit_message(&message_id, content).await,
            WsClientEvent::DeleteMessage { message_id } => self.delete_message(&message_id).await,
            WsClientEvent::ReactMessage { message_id, emoji } => self.react(&message_id, &emoji).await,
            WsClientEvent::MessageRead { conversation_id } => self.message_read(&conversation_id).await,
            WsClientEvent::RegenerateResponse { conversation_id } => self.regenerate_response(&conversation_id).await,
            WsClientEvent::StopGeneration { conversation_id } => self.stop_generation(&conversation_id).await,
            WsClientEvent::CallInitiate { conversation_id, kind } => self.call_initiate(&conversation_id, kind).await,
            WsClientEvent::CallAccept { call_id } => self.call_accept(&call_id).await,
            WsClientEvent::CallReject { call_id } => self.call_reject(&call_id).await,
            WsClientEvent::CallCancel { call_id } => self.call_cancel(&call_id).await,
            WsClientEvent::CallEnd { call_id } => self.call_end(&call_id).await,
            WsClientEvent::WebrtcOffer { call_id, target_connection_id, sdp } => {
                self.state.call_coordinator.relay_offer(&call_id, &self.connection_id, &target_connection_id, sdp).await;
                Ok(())
            }
            WsClientEvent::WebrtcAnswer { call_id, target_connection_id, sdp } => {
                self.state.call_coordinator.relay_answer(&call_id, &self.connection_id, &target_connection_id, sdp).await;
                Ok(())
            }
            WsClientEvent::WebrtcIce { call_id, target_connection_id, candidate, is_restart } => {
                self.state.call_coordinator.relay_ice(&call_id, &self.connection_id, &target_connection_id, candidate, is_restart).await;
                Ok(())
            }
        }
    }

    /// Bounds a single persistence call to the configured budget
    /// (persistence operations default to a 5 s timeout).
    async fn persist<F, T>(&self, future: F) -> DomainResult<T>
    where
        F: std::future::Future<Output = DomainResult<T>>,
    {
        crate::utils::with_domain_timeout(std::time::Duration::from_secs(self.state.config.realtime.persistence_timeout_seconds), future).await
    }

    /// Every handler that touches a conversation first checks membership;
    /// failure collapses "no such conversation" and "not a member" into one
    /// message (a deliberate non-disclosure choice).
    async fn require_membership(&self, conversation_id: &str) -> DomainResult<()> {
        if self.state.members.is_member(conversation_id, &self.user_id).await? {
            Ok(())
        } else {
            Err(DomainError::NotFound("Conversation not found".to_string()))
        }
    }

    async fn join_conversation(&self, conversation_id: &str) -> DomainResult<()> {
        self.require_membership(conversation_id).await?;
        self.state.registry.join(&self.connection_id, &conversation_room(conversation_id)).await;
        Ok(())
    }

    async fn leave_conversation(&self, conversation_id: &str) -> DomainResult<()> {
        self.state.registry.leave(&self.connection_id, &conversation_room(conversation_id)).await;
        Ok(())
    }

    /// send-message: verify membership, reject if blocked
    /// (DIRECT), persist, advance `updatedAt`, broadcast, then the
    /// post-commit effects: title auto-derivation, offline notifications,
    /// @mentions, and AI invocation.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: String,
        kind: MessageType,
        reply_to_id: Option<String>,
    ) -> DomainResult<()> {
        self.require_membership(conversation_id).await?;

        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(DomainError::Validation(format!("message content exceeds {MAX_MESSAGE_CHARS} characters")));
        }

        let conversation = self
            .state
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Conversation not found".to_string()))?;

        if conversation.kind == crate::domain::ConversationKind::Direct {
            let members = self.state.members.list_user_ids(conversation_id).await?;
            if let Some(other) = members.iter().find(|id| *id != &self.user_id) {
                if self.state.blocks.is_blocked(&self.user_id, other).await? {
                    return Err(DomainError::Authorization("you cannot message this user".to_string()));
                }
            }
        }

        let message = self
            .persist(self.state.messages.create(NewMessage {
                conversation_id: conversation_id.to_string(),
                sender_id: Some(self.user_id.clone()),
                kind,
                content: content.clone(),
                reply_to_id,
                token_count: crate::utils::estimate_tokens(&content),
            }))
            .await?;

        self.state.conversations.touch_updated_at(conversation_id).await?;

        let room = conversation_room(conversation_id);
        self.state.registry.broadcast(&room, &WsServerEvent::NewMessage { conversation_id: conversation_id.to_string(), message: message.clone() }).await;

        if conversation.kind == crate::domain::ConversationKind::AiChat {
            if conversation.title.as_deref() == Some(NEW_CHAT_TITLE) {
                self.derive_title(conversation_id, &content).await;
            }
            self.state.ai_coordinator.generate(conversation_id.to_string(), content, conversation.system_prompt.clone()).await;
        } else {
            self.post_commit_chat_effects(conversation_id, &self.user_id, &content).await;

            if let Some(prompt) = extract_ai_trigger(&content) {
                self.state.ai_coordinator.generate(conversation_id.to_string(), prompt, conversation.system_prompt.clone()).await;
            }
        }

        Ok(())
    }

    async fn derive_title(&self, conversation_id: &str, content: &str) {
        let title: String = content.chars().take(80).collect();
        if let Err(e) = self.state.conversations.set_title(conversation_id, &title).await {
            warn!(conversation_id, error = %e, "failed to auto-derive ai chat title");
            return;
        }
        self.state
            .registry
            .broadcast(&conversation_room(conversation_id), &WsServerEvent::ConversationUpdated { conversation_id: conversation_id.to_string(), title: Some(title) })
            .await;
    }

    /// Post-commit effects for non-AI sends: NEW_MESSAGE to offline members,
    /// MENTION to `@name`-matched members (run after the
    /// broadcast, not inside the persistence transaction).
    async fn post_commit_chat_effects(&self, conversation_id: &str, sender_id: &str, content: &str) {
        let members = match self.state.members.list(conversation_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(conversation_id, error = %e, "failed to list members for post-commit effects");
                return;
            }
        };

        for member in &members {
            if member.user_id == sender_id {
                continue;
            }

            if !self.state.registry.is_online(&member.user_id).await {
                let _ = self
                    .state
                    .notification_service
                    .notify(
                        &member.user_id,
                        NotificationKind::NewMessage,
                        "New message".to_string(),
                        content.chars().take(200).collect(),
                        serde_json::json!({ "conversationId": conversation_id }),
                    )
                    .await;
            }

            if let Ok(Some(user)) = self.state.users.find_by_id(&member.user_id).await {
                if mentions(content, &user.display_name) {
                    let _ = self
                        .state
                        .notification_service
                        .notify(
                            &member.user_id,
                            NotificationKind::Mention,
                            "You were mentioned".to_string(),
                            content.chars().take(200).collect(),
                            serde_json::json!({ "conversationId": conversation_id }),
                        )
                        .await;
                }
            }
        }
    }

    /// edit-message: only own TEXT messages. In AI_CHAT, the
    /// edit cascade-deletes later messages in one transaction, then
    /// re-invokes generation for the edited prompt.
    async fn edit_message(&self, message_id: &str, content: String) -> DomainResult<()> {
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(DomainError::Validation(format!("message content exceeds {MAX_MESSAGE_CHARS} characters")));
        }

        let message = self.state.messages.find_by_id(message_id).await?.ok_or_else(|| DomainError::NotFound("message not found".to_string()))?;

        if message.sender_id.as_deref() != Some(self.user_id.as_str()) {
            return Err(DomainError::Authorization("you can only edit your own messages".to_string()));
        }
        if message.kind != MessageType::Text {
            return Err(DomainError::Validation("only text messages can be edited".to_string()));
        }

        let conversation_kind = self.state.conversations.kind_of(&message.conversation_id).await?;
        let room = conversation_room(&message.conversation_id);

        if conversation_kind == Some(crate::domain::ConversationKind::AiChat) {
            let (edited, dropped) = self.persist(self.state.messages.edit_ai_chat_cascading(message_id, &content)).await?;

            for victim in dropped {
                self.state.registry.broadcast(&room, &WsServerEvent::MessageDeleted { conversation_id: message.conversation_id.clone(), message_id: victim.id }).await;
            }

            self.state.registry.broadcast(&room, &WsServerEvent::MessageUpdated { conversation_id: message.conversation_id.clone(), message: edited }).await;

            let conversation = self.state.conversations.find_by_id(&message.conversation_id).await?;
            self.state
                .ai_coordinator
                .generate(message.conversation_id.clone(), content, conversation.and_then(|c| c.system_prompt))
                .await;
        } else {
            let edited = self.persist(self.state.messages.edit(message_id, &content)).await?;
            self.state.registry.broadcast(&room, &WsServerEvent::MessageUpdated { conversation_id: message.conversation_id.clone(), message: edited }).await;
        }

        Ok(())
    }

    /// delete-message: soft delete, own messages only.
    async fn delete_message(&self, message_id: &str) -> DomainResult<()> {
        let message = self.state.messages.find_by_id(message_id).await?.ok_or_else(|| DomainError::NotFound("message not found".to_string()))?;

        if message.sender_id.as_deref() != Some(self.user_id.as_str()) {
            return Err(DomainError::Authorization("you can only delete your own messages".to_string()));
        }

        self.persist(self.state.messages.soft_delete(message_id)).await?;
        self.state
            .registry
            .broadcast(&conversation_room(&message.conversation_id), &WsServerEvent::MessageDeleted { conversation_id: message.conversation_id, message_id: message_id.to_string() })
            .await;
        Ok(())
    }

    /// react: toggle, broadcast the full reaction set.
    async fn react(&self, message_id: &str, emoji: &str) -> DomainResult<()> {
        let message = self.state.messages.find_by_id(message_id).await?.ok_or_else(|| DomainError::NotFound("message not found".to_string()))?;

        let reactions = self.persist(self.state.reactions.toggle(message_id, &self.user_id, emoji)).await?;
        self.state
            .registry
            .broadcast(&conversation_room(&message.conversation_id), &WsServerEvent::MessageReactionUpdated { message_id: message_id.to_string(), reactions })
            .await;
        Ok(())
    }

    /// message-read: advance the caller's `lastReadAt`, mark
    /// all unread messages not authored by the caller as READ, broadcast a
    /// sentinel `message_id=""` meaning "all in conversation".
    async fn message_read(&self, conversation_id: &str) -> DomainResult<()> {
        self.require_membership(conversation_id).await?;

        self.state.members.set_last_read_at(conversation_id, &self.user_id, Utc::now()).await?;
        self.persist(self.state.messages.mark_all_read(conversation_id, &self.user_id)).await?;

        self.state
            .registry
            .broadcast(
                &conversation_room(conversation_id),
                &WsServerEvent::MessageStatusUpdate { conversation_id: conversation_id.to_string(), message_id: String::new(), status: crate::domain::MessageStatus::Read },
            )
            .await;
        Ok(())
    }

    /// typing start/stop: no persistence, broadcast to the room
    /// excluding the sender. The registry has no "exclude" primitive, so
    /// this sends to every room occupant except itself directly.
    async fn typing(&self, conversation_id: &str, is_typing: bool) -> DomainResult<()> {
        self.require_membership(conversation_id).await?;

        let event = WsServerEvent::Typing { conversation_id: conversation_id.to_string(), user_id: self.user_id.clone(), is_typing };
        for connection_id in self.state.registry.connections_of_room_excluding(&conversation_room(conversation_id), &self.connection_id).await {
            self.state.registry.send_to(&connection_id, &event).await;
        }
        Ok(())
    }

    async fn regenerate_response(&self, conversation_id: &str) -> DomainResult<()> {
        self.require_membership(conversation_id).await?;
        let conversation = self.state.conversations.find_by_id(conversation_id).await?;
        self.state.ai_coordinator.regenerate(conversation_id.to_string(), &self.user_id, conversation.and_then(|c| c.system_prompt)).await
    }

    async fn stop_generation(&self, conversation_id: &str) -> DomainResult<()> {
        self.require_membership(conversation_id).await?;
        self.state.ai_coordinator.stop_generation(conversation_id).await;
        Ok(())
    }

    async fn call_initiate(&self, conversation_id: &str, kind: crate::domain::CallKind) -> DomainResult<()> {
        self.require_membership(conversation_id).await?;

        let members = self.state.members.list_user_ids(conversation_id).await?;
        let callee = members.into_iter().find(|id| id != &self.user_id).ok_or_else(|| DomainError::Validation("no other member to call".to_string()))?;

        self.state.call_coordinator.initiate(conversation_id, &self.user_id, &callee, kind).await.map_err(DomainError::from)?;
        Ok(())
    }

    async fn call_accept(&self, call_id: &str) -> DomainResult<()> {
        self.state.call_coordinator.accept(call_id, &self.user_id).await.map(|_| ()).map_err(DomainError::from)
    }

    async fn call_reject(&self, call_id: &str) -> DomainResult<()> {
        self.state.call_coordinator.reject(call_id, &self.user_id).await.map(|_| ()).map_err(DomainError::from)
    }

    async fn call_cancel(&self, call_id: &str) -> DomainResult<()> {
        self.state.call_coordinator.cancel(call_id, &self.user_id).await.map(|_| ()).map_err(DomainError::from)
    }

    async fn call_end(&self, call_id: &str) -> DomainResult<()> {
        self.state.call_coordinator.end(call_id, &self.user_id).await.map(|_| ()).map_err(DomainError::from)
    }
}

/// Strips the `@ai`/`/ai ` trigger from a non-AI message, returning the
/// residue to feed into generation.
fn extract_ai_trigger(content: &str) -> Option<String> {
    let trimmed = content.trim_start();
    if let Some(rest) = trimmed.strip_prefix(AI_SLASH_TRIGGER) {
        return Some(rest.trim().to_string());
    }

    let pos = trimmed.to_ascii_lowercase().find(AI_MENTION_TRIGGER)?;
    let mut residue = String::with_capacity(trimmed.len());
    residue.push_str(&trimmed[..pos]);
    residue.push_str(&trimmed[pos + AI_MENTION_TRIGGER.len()..]);
    Some(residue.trim().to_string())
}

/// Case-insensitive substring match on display name (see DESIGN.md for
/// why a literal substring rule was chosen over a stable handle).
fn mentions(content: &str, display_name: &str) -> bool {
    let needle = format!("@{}", display_name.to_lowercase());
    content.to_lowercase().contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_slash_trigger() {
        assert_eq!(extract_ai_trigger("/ai what's the weather"), Some("what's the weather".to_string()));
    }

    #[test]
    fn extracts_mention_trigger_case_insensitively() {
        assert_eq!(extract_ai_trigger("hey @AI summarize this thread"), Some("hey  summarize this thread".to_string()));
    }

    #[test]
    fn plain_messages_have_no_trigger() {
        assert_eq!(extract_ai_trigger("just a normal message"), None);
    }

    #[test]
    fn slash_trigger_takes_priority_over_mention_text() {
        assert_eq!(extract_ai_trigger("/ai @ai nested"), Some("@ai nested".to_string()));
    }

    #[test]
    fn mentions_matches_case_insensitively() {
        assert!(mentions("hey @Bob check this out", "bob"));
        assert!(mentions("hey @bob check this out", "Bob"));
    }

    #[test]
    fn mentions_requires_the_at_prefix() {
        assert!(!mentions("bob is here but not mentioned", "bob"));
    }
}
