// src/ws/events.rs
// Closed sum types for the realtime wire protocol. Unknown variants on
// the inbound side are rejected at decode time instead of silently
// ignored, using the same `#[serde(tag = "type")]` idiom as
// `api/ws/message.rs`'s `WsClientMessage`/`WsServerMessage`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{CallKind, Message, MessageType};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WsClientEvent {
    JoinConversation { conversation_id: String },
    LeaveConversation { conversation_id: String },
    SendMessage {
        conversation_id: String,
        content: String,
        #[serde(default)]
        r#type: Option<MessageType>,
        #[serde(default)]
        reply_to_id: Option<String>,
    },
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
    EditMessage { message_id: String, content: String },
    DeleteMessage { message_id: String },
    ReactMessage { message_id: String, emoji: String },
    MessageRead { conversation_id: String },
    RegenerateResponse { conversation_id: String },
    StopGeneration { conversation_id: String },
    CallInitiate { conversation_id: String, kind: CallKind },
    CallAccept { call_id: String },
    CallReject { call_id: String },
    CallCancel { call_id: String },
    CallEnd { call_id: String },
    WebrtcOffer { call_id: String, target_connection_id: String, sdp: Value },
    WebrtcAnswer { call_id: String, target_connection_id: String, sdp: Value },
    WebrtcIce {
        call_id: String,
        target_connection_id: String,
        candidate: Value,
        #[serde(default)]
        is_restart: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum WsServerEvent {
    NewMessage { conversation_id: String, message: Message },
    MessageUpdated { conversation_id: String, message: Message },
    MessageDeleted { conversation_id: String, message_id: String },
    MessageReactionUpdated { message_id: String, reactions: Vec<crate::domain::Reaction> },
    MessageStatusUpdate { conversation_id: String, message_id: String, status: crate::domain::MessageStatus },
    Typing { conversation_id: String, user_id: String, is_typing: bool },
    ConversationUpdated { conversation_id: String, title: Option<String> },
    GroupUpdated { conversation_id: String },
    GroupMemberAdded { conversation_id: String, user_id: String },
    GroupMemberRemoved { conversation_id: String, user_id: String },
    AiStreamStart { conversation_id: String, message_id: String },
    AiStreamChunk { conversation_id: String, message_id: String, chunk: String },
    AiStreamEnd { conversation_id: String, message_id: String, full_content: String },
    AiStreamError { conversation_id: String, error: String },
    UserOnline { user_id: String },
    UserOffline { user_id: String, last_seen_at: chrono::DateTime<chrono::Utc> },
    IncomingCall { call_id: String, conversation_id: String, caller_id: String, kind: CallKind },
    CallAccepted { call_id: String },
    CallDeclined { call_id: String },
    CallCancelled { call_id: String },
    CallEnded { call_id: String },
    WebrtcOffer { call_id: String, from_connection_id: String, sdp: Value },
    WebrtcAnswer { call_id: String, from_connection_id: String, sdp: Value },
    WebrtcIce { call_id: String, from_connection_id: String, candidate: Value, is_restart: bool },
    WebrtcIceAck { call_id: String },
    PeerLeft { room: String, connection_id: String },
    NewNotification { notification: crate::domain::Notification },
    Error { message: String, kind: Option<String> },
}
