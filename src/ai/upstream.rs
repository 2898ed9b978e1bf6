// src/ai/upstream.rs
// Models the upstream streaming completion model as a trait returning a
// boxed stream of `StreamEvent`, adapting the `StreamEvent`/`from_sse_line`
// SSE-parsing idiom in `llm/provider/stream.rs` from the OpenAI Responses
// API shape to a Chat Completions-style delta feed.

use std::pin::Pin;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::Stream;
use reqwest_eventsource::{Event, EventSource};
use serde_json::json;
use tokio_stream::StreamExt as _;

use crate::domain::DomainError;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta { delta: String },
    Done,
}

pub type UpstreamStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, DomainError>> + Send>>;

#[async_trait]
pub trait UpstreamCompletion: Send + Sync {
    async fn stream(&self, system_prompt: Option<&str>, messages: &[(String, String)]) -> Result<UpstreamStream, DomainError>;
}

pub struct OpenAiCompatibleCompletion {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleCompletion {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self { client: reqwest::Client::new(), base_url, api_key, model }
    }

    fn from_sse_event(event: &str) -> Option<StreamEvent> {
        if event == "[DONE]" {
            return Some(StreamEvent::Done);
        }

        let json: serde_json::Value = serde_json::from_str(event).ok()?;
        let delta = json.pointer("/choices/0/delta/content")?.as_str()?;

        Some(StreamEvent::TextDelta { delta: delta.to_string() })
    }
}

#[async_trait]
impl UpstreamCompletion for OpenAiCompatibleCompletion {
    async fn stream(&self, system_prompt: Option<&str>, messages: &[(String, String)]) -> Result<UpstreamStream, DomainError> {
        let mut payload_messages = Vec::new();
        if let Some(system_prompt) = system_prompt {
            payload_messages.push(json!({ "role": "system", "content": system_prompt }));
        }
        for (role, content) in messages {
            // Context assembly speaks in the domain's own role vocabulary
            // ("user"/"model"); the wire format here is OpenAI
            // chat-completions-compatible, which only recognizes
            // "assistant" for the model's own turns.
            let wire_role = if role == "model" { "assistant" } else { role.as_str() };
            payload_messages.push(json!({ "role": wire_role, "content": content }));
        }

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "messages": payload_messages, "stream": true }));

        let mut source = EventSource::new(request).map_err(|e| DomainError::UpstreamUnavailable(e.to_string()))?;

        let stream = try_stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        match Self::from_sse_event(&message.data) {
                            Some(StreamEvent::Done) => {
                                yield StreamEvent::Done;
                                break;
                            }
                            Some(event) => yield event,
                            None => continue,
                        }
                    }
                    Err(e) => {
                        Err(DomainError::UpstreamUnavailable(e.to_string()))?;
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
