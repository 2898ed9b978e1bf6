// src/ws/connection.rs
// A wrapper around a single WebSocket connection that owns the send half
// and tracks liveness, addressed through the closed `WsServerEvent` set.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::events::WsServerEvent;
use super::heartbeat::{HeartbeatManager, StatusSender};

pub struct WebSocketConnection {
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    last_activity: Mutex<Instant>,
    is_closed: Arc<Mutex<bool>>,
    heartbeat: HeartbeatManager<PingSender>,
}

struct PingSender {
    sender: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    is_closed: Arc<Mutex<bool>>,
}

impl StatusSender for PingSender {
    fn send_ping(&self) {
        let sender = self.sender.clone();
        let is_closed = self.is_closed.clone();

        tokio::spawn(async move {
            if *is_closed.lock().await {
                return;
            }

            let mut guard = sender.lock().await;
            if let Err(e) = guard.send(Message::Ping(Vec::new().into())).await {
                warn!("heartbeat ping failed, connection likely closed: {}", e);
            }
        });
    }
}

impl WebSocketConnection {
    /// Splits the socket, wiring the send half into `self` and handing the
    /// receive half back to the caller's dispatch loop.
    pub fn new(socket: WebSocket) -> (Self, SplitStream<WebSocket>) {
        let (sender, receiver) = socket.split();
        let sender = Arc::new(Mutex::new(sender));
        let is_closed = Arc::new(Mutex::new(false));

        let heartbeat = HeartbeatManager::new(Arc::new(PingSender { sender: sender.clone(), is_closed: is_closed.clone() }));
        heartbeat.start(Duration::from_secs(15));

        (Self { sender, last_activity: Mutex::new(Instant::now()), is_closed, heartbeat }, receiver)
    }

    pub async fn is_closed(&self) -> bool {
        *self.is_closed.lock().await
    }

    pub async fn mark_closed(&self) {
        *self.is_closed.lock().await = true;
        self.heartbeat.stop();
    }

    pub async fn send_event(&self, event: &WsServerEvent) {
        if self.is_closed().await {
            return;
        }

        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to encode outbound ws event: {}", e);
                return;
            }
        };

        let mut sender = self.sender.lock().await;
        if let Err(e) = sender.send(Message::Text(Utf8Bytes::from(payload))).await {
            debug!("send failed, marking connection closed: {}", e);
            drop(sender);
            self.mark_closed().await;
        }
    }

    pub async fn send_error(&self, message: impl Into<String>, kind: Option<String>) {
        self.send_event(&WsServerEvent::Error { message: message.into(), kind }).await;
    }

    pub async fn update_activity(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    pub async fn get_last_activity(&self) -> Instant {
        *self.last_activity.lock().await
    }
}
