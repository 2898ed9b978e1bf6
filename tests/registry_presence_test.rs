// tests/registry_presence_test.rs
// Multi-device presence: a user stays online as long as at least one
// connection is live, and goes offline only when the last one drops.
// Exercises `ConnectionRegistry` through a real WebSocket upgrade rather
// than constructing `WebSocketConnection` directly (it owns a live axum
// socket split and has no in-memory constructor), using the same
// real-server-plus-client harness as
// `backend/tests/websocket_connection_test.rs`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use realtime_chat_core::registry::ConnectionRegistry;
use realtime_chat_core::ws::connection::WebSocketConnection;
use tokio::net::TcpListener;
use tokio::time::sleep;

async fn spawn_test_server() -> (String, Arc<ConnectionRegistry>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");

    let app = Router::new()
        .route("/ws/{user_id}", get(ws_handler))
        .route("/online/{user_id}", get(online_handler))
        .with_state(registry.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    sleep(Duration::from_millis(50)).await;
    (format!("ws://{addr}"), registry)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<ConnectionRegistry>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let (connection, mut receiver) = WebSocketConnection::new(socket);
        registry.register(&user_id, &connection_id, Arc::new(connection)).await;

        while receiver.next().await.is_some() {}

        registry.unregister(&connection_id).await;
    })
}

async fn online_handler(State(registry): State<Arc<ConnectionRegistry>>, Path(user_id): Path<String>) -> String {
    registry.is_online(&user_id).await.to_string()
}

async fn is_online(base_url: &str, user_id: &str) -> bool {
    reqwest::get(format!("{}/online/{user_id}", base_url.replacen("ws://", "http://", 1)))
        .await
        .expect("online query")
        .text()
        .await
        .expect("online body")
        == "true"
}

#[tokio::test]
async fn stays_online_until_last_connection_drops() {
    let (base_url, _registry) = spawn_test_server().await;

    assert!(!is_online(&base_url, "alice").await);

    let (client_a, _) = tokio_tungstenite::connect_async(format!("{base_url}/ws/alice")).await.expect("client a connects");
    sleep(Duration::from_millis(50)).await;
    assert!(is_online(&base_url, "alice").await);

    let (client_b, _) = tokio_tungstenite::connect_async(format!("{base_url}/ws/alice")).await.expect("client b connects");
    sleep(Duration::from_millis(50)).await;
    assert!(is_online(&base_url, "alice").await, "still online with a second device connected");

    drop(client_a);
    sleep(Duration::from_millis(100)).await;
    assert!(is_online(&base_url, "alice").await, "dropping one of two devices must not go offline");

    drop(client_b);
    sleep(Duration::from_millis(100)).await;
    assert!(!is_online(&base_url, "alice").await, "dropping the last device must go offline");
}

#[tokio::test]
async fn users_are_isolated() {
    let (base_url, _registry) = spawn_test_server().await;

    let (_client, _) = tokio_tungstenite::connect_async(format!("{base_url}/ws/bob")).await.expect("bob connects");
    sleep(Duration::from_millis(50)).await;

    assert!(is_online(&base_url, "bob").await);
    assert!(!is_online(&base_url, "carol").await);
}
