// src/ws/mod.rs
// WebSocket upgrade and the per-connection session lifecycle: registers
// the connection, loops on inbound text frames dispatched through the
// closed `WsClientEvent` protocol, and cleans up on disconnect.
// Hard-rejects any handshake without a valid access token.

pub mod connection;
pub mod events;
pub mod handlers;
pub mod heartbeat;

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::domain::DomainError;
use crate::error::to_ws_event;
use crate::registry::user_room;
use crate::state::AppState;

use self::connection::WebSocketConnection;
use self::events::WsClientEvent;
use self::handlers::Handlers;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
) -> Response {
    let user_id = match state.auth_service.verify_access_token(&query.token) {
        Ok(user_id) => user_id,
        Err(_) => {
            warn!("rejected websocket handshake from {} with invalid token", addr);
            return (StatusCode::UNAUTHORIZED, "invalid or missing access token").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, addr, user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, addr: SocketAddr, user_id: String) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let (connection, mut receiver) = WebSocketConnection::new(socket);
    let connection = Arc::new(connection);

    let handshake_timeout = std::time::Duration::from_secs(state.config.realtime.handshake_timeout_seconds);
    let handshake = async {
        let became_online = state.registry.register(&user_id, &connection_id, connection.clone()).await;
        if became_online {
            if let Err(e) = state.presence.mark_online(&user_id).await {
                warn!(user_id = %user_id, error = %e, "failed to mark user online");
            }
            if let Err(e) = state.users.set_online(&user_id, true, None).await {
                warn!(user_id = %user_id, error = %e, "failed to persist online status");
            }
            state.registry.broadcast_to_user(&user_id, &events::WsServerEvent::UserOnline { user_id: user_id.clone() }).await;
        }
    };

    if tokio::time::timeout(handshake_timeout, handshake).await.is_err() {
        warn!(connection_id = %connection_id, user_id = %user_id, "handshake registration exceeded timeout, closing");
        state.registry.unregister(&connection_id).await;
        connection.mark_closed().await;
        return;
    }

    info!(connection_id = %connection_id, user_id = %user_id, %addr, "websocket connected");

    let limiter = RateLimiter::direct(Quota::per_minute(
        NonZeroU32::new(state.config.realtime.events_per_minute_per_connection).unwrap_or(NonZeroU32::MIN),
    ));

    let handlers = Handlers::new(state.clone(), connection.clone(), connection_id.clone(), user_id.clone());
    let connected_at = Instant::now();

    while let Some(result) = receiver.next().await {
        let raw = match result {
            Ok(message) => message,
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "websocket read error");
                break;
            }
        };

        connection.update_activity().await;

        match raw {
            Message::Text(text) => {
                if limiter.check().is_err() {
                    connection.send_error("rate limit exceeded", Some("rate_limited".to_string())).await;
                    continue;
                }

                match serde_json::from_str::<WsClientEvent>(&text) {
                    Ok(event) => {
                        if let Err(e) = handlers.dispatch(event).await {
                            connection.send_event(&to_ws_event(&e)).await;
                        }
                    }
                    Err(e) => {
                        debug!(connection_id = %connection_id, error = %e, "failed to decode client event");
                        connection.send_event(&to_ws_event(&DomainError::Validation("malformed event".to_string()))).await;
                    }
                }
            }
            Message::Close(_) => {
                info!(connection_id = %connection_id, "client initiated close");
                break;
            }
            _ => {}
        }
    }

    connection.mark_closed().await;

    let rooms_before_unregister = state.registry.rooms_of(&connection_id).await;

    let outcome = state.registry.unregister(&connection_id).await;

    // A pending generation is cancelled only if this was the user's last
    // connection subscribed to the conversation; other live devices of
    // the same user still reach the in-flight stream's output.
    for room in &rooms_before_unregister {
        if let Some(conversation_id) = room.strip_prefix("conversation:") {
            if !state.registry.user_has_connection_in_room(&user_id, room).await {
                state.ai_coordinator.stop_generation(conversation_id).await;
            }
        }
    }

    if let Some(outcome) = outcome {
        if outcome.went_offline {
            // An active call is treated as implicitly ended only once the
            // user's whole connection set empties, not on the departure of
            // any single device still sharing the call's room.
            for room in &rooms_before_unregister {
                if let Some(conversation_id) = room.strip_prefix("conversation:") {
                    state.call_coordinator.end_for_disconnected_user(conversation_id, &user_id).await;
                }
            }

            let last_seen_at = chrono::Utc::now();
            if let Err(e) = state.presence.mark_offline(&user_id).await {
                warn!(user_id = %user_id, error = %e, "failed to mark user offline");
            }
            if let Err(e) = state.users.set_online(&user_id, false, Some(last_seen_at)).await {
                warn!(user_id = %user_id, error = %e, "failed to persist offline status");
            }
            state.registry.broadcast(&user_room(&user_id), &events::WsServerEvent::UserOffline { user_id: user_id.clone(), last_seen_at }).await;
        }
    }

    info!(
        connection_id = %connection_id,
        user_id = %user_id,
        duration_secs = connected_at.elapsed().as_secs_f64(),
        "websocket disconnected"
    );
}
