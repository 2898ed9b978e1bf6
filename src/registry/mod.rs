// src/registry/mod.rs
// Connection registry: userId -> set of live connections, connectionId ->
// joined rooms. A plain struct behind `Arc`, guarded by a
// `tokio::sync::RwLock<HashMap<..>>` per index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::ws::connection::WebSocketConnection;
use crate::ws::events::WsServerEvent;

pub fn user_room(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn conversation_room(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

/// Outcome of removing a connection, letting the caller react to an
/// online->offline transition and notify the Call State Machine for any
/// conversation room the connection was a participant of.
pub struct UnregisterOutcome {
    pub user_id: String,
    pub went_offline: bool,
    pub rooms_left: Vec<String>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<WebSocketConnection>>>,
    connection_user: RwLock<HashMap<String, String>>,
    user_connections: RwLock<HashMap<String, HashSet<String>>>,
    connection_rooms: RwLock<HashMap<String, HashSet<String>>>,
    rooms: RwLock<HashMap<String, HashSet<String>>>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for_user(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Registers a connection for `user_id`, auto-joining `user:{userId}`.
    /// Returns true iff this is the user's first live connection (an
    /// online transition the caller should broadcast and persist).
    pub async fn register(&self, user_id: &str, connection_id: &str, connection: Arc<WebSocketConnection>) -> bool {
        let user_lock = self.lock_for_user(user_id).await;
        let _guard = user_lock.lock().await;

        self.connections.write().await.insert(connection_id.to_string(), connection);
        self.connection_user.write().await.insert(connection_id.to_string(), user_id.to_string());

        let became_online = {
            let mut user_connections = self.user_connections.write().await;
            let set = user_connections.entry(user_id.to_string()).or_default();
            let was_empty = set.is_empty();
            set.insert(connection_id.to_string());
            was_empty
        };

        self.join(connection_id, &user_room(user_id)).await;

        debug!(connection_id, user_id, became_online, "registered connection");
        became_online
    }

    /// Removes a connection from every index, emitting `peer:left` to
    /// remaining occupants of each room it was in.
    pub async fn unregister(&self, connection_id: &str) -> Option<UnregisterOutcome> {
        let user_id = self.connection_user.write().await.remove(connection_id)?;
        let user_lock = self.lock_for_user(&user_id).await;
        let _guard = user_lock.lock().await;

        self.connections.write().await.remove(connection_id);

        let rooms_left: Vec<String> =
            self.connection_rooms.write().await.remove(connection_id).map(|set| set.into_iter().collect()).unwrap_or_default();

        for room in &rooms_left {
            if let Some(occupants) = self.rooms.write().await.get_mut(room) {
                occupants.remove(connection_id);
            }
            self.broadcast(room, &WsServerEvent::PeerLeft { room: room.clone(), connection_id: connection_id.to_string() }).await;
        }

        let went_offline = {
            let mut user_connections = self.user_connections.write().await;
            if let Some(set) = user_connections.get_mut(&user_id) {
                set.remove(connection_id);
                if set.is_empty() {
                    user_connections.remove(&user_id);
                    true
                } else {
                    false
                }
            } else {
                false
            }
        };

        debug!(connection_id, user_id = %user_id, went_offline, "unregistered connection");
        Some(UnregisterOutcome { user_id, went_offline, rooms_left })
    }

    pub async fn join(&self, connection_id: &str, room: &str) {
        self.rooms.write().await.entry(room.to_string()).or_default().insert(connection_id.to_string());
        self.connection_rooms.write().await.entry(connection_id.to_string()).or_default().insert(room.to_string());
    }

    pub async fn leave(&self, connection_id: &str, room: &str) {
        if let Some(occupants) = self.rooms.write().await.get_mut(room) {
            occupants.remove(connection_id);
        }
        if let Some(joined) = self.connection_rooms.write().await.get_mut(connection_id) {
            joined.remove(room);
        }
    }

    pub async fn connections_of(&self, user_id: &str) -> Vec<String> {
        self.user_connections.read().await.get(user_id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.user_connections.read().await.get(user_id).is_some_and(|set| !set.is_empty())
    }

    pub async fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        self.connection_rooms.read().await.get(connection_id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Room occupants other than `excluding` (used for `typing`, which
    /// broadcasts to the conversation room except the sender).
    pub async fn connections_of_room_excluding(&self, room: &str, excluding: &str) -> Vec<String> {
        self.rooms.read().await.get(room).map(|set| set.iter().filter(|id| id.as_str() != excluding).cloned().collect()).unwrap_or_default()
    }

    pub async fn send_to(&self, connection_id: &str, event: &WsServerEvent) {
        let connection = self.connections.read().await.get(connection_id).cloned();
        if let Some(connection) = connection {
            connection.send_event(event).await;
        }
    }

    pub async fn broadcast(&self, room: &str, event: &WsServerEvent) {
        let occupants: Vec<String> = self.rooms.read().await.get(room).map(|set| set.iter().cloned().collect()).unwrap_or_default();

        let connections = self.connections.read().await;
        for connection_id in occupants {
            if let Some(connection) = connections.get(&connection_id) {
                connection.send_event(event).await;
            }
        }
    }

    pub async fn broadcast_to_user(&self, user_id: &str, event: &WsServerEvent) {
        self.broadcast(&user_room(user_id), event).await;
    }

    /// True iff `user_id` still has a live connection joined to `room`.
    /// Disconnection only cancels generation when no other live connection
    /// of the same user remains a subscriber of the conversation.
    pub async fn user_has_connection_in_room(&self, user_id: &str, room: &str) -> bool {
        let user_conns = self.user_connections.read().await.get(user_id).cloned().unwrap_or_default();
        if user_conns.is_empty() {
            return false;
        }
        let occupants = self.rooms.read().await.get(room).cloned().unwrap_or_default();
        user_conns.iter().any(|c| occupants.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `join`/`leave`/`rooms_of` only touch the room indexes, so these run
    // against a bare registry with no live connections (multi-device
    // presence transitions are covered by `tests/registry_presence_test.rs`,
    // which needs a real socket to exercise `register`/`unregister`).

    #[tokio::test]
    async fn room_excludes_only_the_given_connection() {
        let registry = ConnectionRegistry::new();
        let room = conversation_room("c1");

        registry.join("conn-a", &room).await;
        registry.join("conn-b", &room).await;
        registry.join("conn-c", &room).await;

        let mut others = registry.connections_of_room_excluding(&room, "conn-a").await;
        others.sort();
        assert_eq!(others, vec!["conn-b".to_string(), "conn-c".to_string()]);
    }

    #[tokio::test]
    async fn leaving_a_room_removes_it_from_both_indexes() {
        let registry = ConnectionRegistry::new();
        let room = conversation_room("c1");

        registry.join("conn-a", &room).await;
        assert_eq!(registry.rooms_of("conn-a").await, vec![room.clone()]);

        registry.leave("conn-a", &room).await;
        assert!(registry.rooms_of("conn-a").await.is_empty());
        assert!(registry.connections_of_room_excluding(&room, "nonexistent").await.is_empty());
    }
}
