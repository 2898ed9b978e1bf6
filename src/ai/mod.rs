// src/ai/mod.rs
// AI generation coordinator: context assembly, upstream streaming
// invocation, chunk fan-out, completion persistence, cancellation,
// single-flight per conversation.

pub mod upstream;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_stream::StreamExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{DomainError, MessageType};
use crate::registry::{conversation_room, ConnectionRegistry};
use crate::repo::MessageRepository;
use crate::ws::events::WsServerEvent;

use self::upstream::{StreamEvent, UpstreamCompletion};

#[derive(Debug, Error)]
pub enum AiError {
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<AiError> for DomainError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::Domain(inner) => inner,
        }
    }
}

pub struct AiCoordinator {
    messages: Arc<dyn MessageRepository>,
    registry: Arc<ConnectionRegistry>,
    upstream: Option<Arc<dyn UpstreamCompletion>>,
    context_window_messages: i64,
    context_window_chars: usize,
    call_timeout: Duration,
    idle_timeout: Duration,
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

impl AiCoordinator {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        registry: Arc<ConnectionRegistry>,
        upstream: Option<Arc<dyn UpstreamCompletion>>,
        context_window_messages: i64,
        context_window_chars: usize,
        call_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            messages,
            registry,
            upstream,
            context_window_messages,
            context_window_chars,
            call_timeout,
            idle_timeout,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the bounded context window: last N messages of type TEXT or
    /// AI_RESPONSE, newest-first trimmed to a character budget that
    /// includes the new prompt, then mapped to (role, content) pairs in
    /// chronological order.
    async fn assemble_context(&self, conversation_id: &str, prompt: &str) -> Result<Vec<(String, String)>, DomainError> {
        let recent = self.messages.list_for_context(conversation_id, self.context_window_messages).await?;

        let eligible: Vec<_> = recent.into_iter().filter(|m| matches!(m.kind, MessageType::Text | MessageType::AiResponse)).collect();

        let mut budget = self.context_window_chars.saturating_sub(prompt.chars().count());
        let mut kept = Vec::new();

        for message in eligible.into_iter().rev() {
            let len = message.content.chars().count();
            if len > budget {
                break;
            }
            budget -= len;
            let role = match message.kind {
                MessageType::Text => "user",
                MessageType::AiResponse => "model",
                _ => unreachable!("filtered above"),
            };
            kept.push((role.to_string(), message.content));
        }

        kept.reverse();
        Ok(kept)
    }

    /// Entry point: `generate(conversationId, prompt, systemPrompt?)`.
    /// Single-flight per conversation; a second call supersedes the first.
    pub async fn generate(self: &Arc<Self>, conversation_id: String, prompt: String, system_prompt: Option<String>) {
        let token = CancellationToken::new();

        let previous = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.insert(conversation_id.clone(), token.clone())
        };

        if let Some(previous) = previous {
            previous.cancel();
            self.registry
                .broadcast(&conversation_room(&conversation_id), &WsServerEvent::AiStreamError { conversation_id: conversation_id.clone(), error: "superseded".to_string() })
                .await;
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run_generation(conversation_id, prompt, system_prompt, token).await;
        });
    }

    async fn run_generation(&self, conversation_id: String, prompt: String, system_prompt: Option<String>, cancel: CancellationToken) {
        let room = conversation_room(&conversation_id);

        let Some(upstream) = &self.upstream else {
            self.registry.broadcast(&room, &WsServerEvent::AiStreamError { conversation_id: conversation_id.clone(), error: "ai_not_configured".to_string() }).await;
            self.in_flight.lock().await.remove(&conversation_id);
            return;
        };

        let message_id = uuid::Uuid::new_v4().to_string();

        let context = match self.assemble_context(&conversation_id, &prompt).await {
            Ok(mut context) => {
                context.push(("user".to_string(), prompt));
                context
            }
            Err(e) => {
                self.registry.broadcast(&room, &WsServerEvent::AiStreamError { conversation_id: conversation_id.clone(), error: e.to_string() }).await;
                self.in_flight.lock().await.remove(&conversation_id);
                return;
            }
        };

        let mut stream = match upstream.stream(system_prompt.as_deref(), &context).await {
            Ok(stream) => stream,
            Err(e) => {
                self.registry.broadcast(&room, &WsServerEvent::AiStreamError { conversation_id: conversation_id.clone(), error: e.to_string() }).await;
                self.in_flight.lock().await.remove(&conversation_id);
                return;
            }
        };

        self.registry.broadcast(&room, &WsServerEvent::AiStreamStart { conversation_id: conversation_id.clone(), message_id: message_id.clone() }).await;

        let mut full_content = String::new();
        let mut upstream_error = None;
        let mut timed_out = false;

        let deadline = Instant::now() + self.call_timeout;

        'stream: loop {
            let idle = sleep(self.idle_timeout);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(conversation_id = %conversation_id, "generation cancelled, discarding partial output");
                    self.in_flight.lock().await.remove(&conversation_id);
                    return;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    timed_out = true;
                    upstream_error = Some("upstream call exceeded wall-clock timeout".to_string());
                    break 'stream;
                }
                _ = idle => {
                    timed_out = true;
                    upstream_error = Some("upstream produced no chunk within idle timeout".to_string());
                    break 'stream;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(StreamEvent::TextDelta { delta })) => {
                            full_content.push_str(&delta);
                            self.registry.broadcast(&room, &WsServerEvent::AiStreamChunk { conversation_id: conversation_id.clone(), message_id: message_id.clone(), chunk: delta }).await;
                        }
                        Some(Ok(StreamEvent::Done)) => break 'stream,
                        Some(Err(e)) => {
                            upstream_error = Some(e.to_string());
                            break 'stream;
                        }
                        None => break 'stream,
                    }
                }
            }
        }

        self.in_flight.lock().await.remove(&conversation_id);

        if let Some(error) = upstream_error {
            if timed_out {
                warn!(conversation_id = %conversation_id, error = %error, "upstream generation timed out, discarding partial output");
            } else {
                warn!(conversation_id = %conversation_id, error = %error, "upstream generation failed");
            }
            self.registry.broadcast(&room, &WsServerEvent::AiStreamError { conversation_id: conversation_id.clone(), error }).await;
            return;
        }

        let token_count = crate::utils::estimate_tokens(&full_content);
        match self.messages.persist_ai_response(&conversation_id, &full_content, token_count).await {
            Ok(persisted) => {
                self.registry
                    .broadcast(&room, &WsServerEvent::AiStreamEnd { conversation_id: conversation_id.clone(), message_id: persisted.id, full_content })
                    .await;
            }
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "failed to persist ai response");
                self.registry.broadcast(&room, &WsServerEvent::AiStreamError { conversation_id, error: e.to_string() }).await;
            }
        }
    }

    pub async fn stop_generation(&self, conversation_id: &str) {
        if let Some(token) = self.in_flight.lock().await.get(conversation_id) {
            token.cancel();
        }
    }

    /// `regenerate-response {conversationId}`: deletes the most recent
    /// AI_RESPONSE, locates the caller's most recent TEXT message, and
    /// re-invokes `generate` with that content.
    pub async fn regenerate(self: &Arc<Self>, conversation_id: String, caller_id: &str, system_prompt: Option<String>) -> Result<(), DomainError> {
        if let Some(previous) = self.messages.most_recent_ai_response(&conversation_id).await? {
            self.messages.delete(&previous.id).await?;
            self.registry
                .broadcast(&conversation_room(&conversation_id), &WsServerEvent::MessageDeleted { conversation_id: conversation_id.clone(), message_id: previous.id })
                .await;
        }

        let Some(prompt_message) = self.messages.most_recent_text_from(&conversation_id, caller_id).await? else {
            return Err(DomainError::NotFound("no prior message to regenerate from".to_string()));
        };

        self.generate(conversation_id, prompt_message.content, system_prompt).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::domain::{DomainResult, Message, MessageStatus};
    use crate::repo::NewMessage;

    struct FakeMessages {
        context: Vec<Message>,
    }

    fn text_message(content: &str) -> Message {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: "c1".to_string(),
            sender_id: Some("alice".to_string()),
            kind: MessageType::Text,
            content: content.to_string(),
            status: MessageStatus::Sent,
            reply_to_id: None,
            is_edited: false,
            is_deleted: false,
            deleted_at: None,
            token_count: crate::utils::estimate_tokens(content),
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl MessageRepository for FakeMessages {
        async fn create(&self, _: NewMessage) -> DomainResult<Message> {
            unimplemented!("not exercised by context assembly tests")
        }
        async fn find_by_id(&self, _: &str) -> DomainResult<Option<Message>> {
            unimplemented!()
        }
        async fn list_for_context(&self, _: &str, _: i64) -> DomainResult<Vec<Message>> {
            Ok(self.context.clone())
        }
        async fn edit(&self, _: &str, _: &str) -> DomainResult<Message> {
            unimplemented!()
        }
        async fn edit_ai_chat_cascading(&self, _: &str, _: &str) -> DomainResult<(Message, Vec<Message>)> {
            unimplemented!()
        }
        async fn soft_delete(&self, _: &str) -> DomainResult<Message> {
            unimplemented!()
        }
        async fn mark_all_read(&self, _: &str, _: &str) -> DomainResult<()> {
            unimplemented!()
        }
        async fn persist_ai_response(&self, _: &str, _: &str, _: i64) -> DomainResult<Message> {
            unimplemented!()
        }
        async fn delete(&self, _: &str) -> DomainResult<()> {
            unimplemented!()
        }
        async fn most_recent_ai_response(&self, _: &str) -> DomainResult<Option<Message>> {
            unimplemented!()
        }
        async fn most_recent_text_from(&self, _: &str, _: &str) -> DomainResult<Option<Message>> {
            unimplemented!()
        }
    }

    fn coordinator_with_context(context: Vec<Message>, context_window_chars: usize) -> AiCoordinator {
        AiCoordinator::new(
            Arc::new(FakeMessages { context }),
            Arc::new(ConnectionRegistry::new()),
            None,
            20,
            context_window_chars,
            Duration::from_secs(60),
            Duration::from_secs(20),
        )
    }

    #[tokio::test]
    async fn assembles_context_in_chronological_order() {
        let messages = vec![text_message("first"), text_message("second"), text_message("third")];
        let coordinator = coordinator_with_context(messages, 10_000);

        let context = coordinator.assemble_context("c1", "new prompt").await.unwrap();
        let contents: Vec<_> = context.iter().map(|(_, content)| content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn drops_oldest_messages_once_the_char_budget_is_exceeded() {
        let messages = vec![text_message("aaaaaaaaaa"), text_message("bbbbbbbbbb"), text_message("cccccccccc")];
        // Budget only fits the prompt plus the two most recent messages.
        let coordinator = coordinator_with_context(messages, 10 + 20);

        let context = coordinator.assemble_context("c1", "0123456789").await.unwrap();
        let contents: Vec<_> = context.iter().map(|(_, content)| content.as_str()).collect();
        assert_eq!(contents, vec!["bbbbbbbbbb", "cccccccccc"]);
    }

    #[tokio::test]
    async fn non_text_non_ai_response_messages_are_excluded_from_context() {
        let mut system_message = text_message("system notice");
        system_message.kind = MessageType::System;
        let coordinator = coordinator_with_context(vec![system_message, text_message("hello")], 10_000);

        let context = coordinator.assemble_context("c1", "prompt").await.unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].1, "hello");
    }
}
