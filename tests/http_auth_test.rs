// tests/http_auth_test.rs
// Drives `/api/auth/*` through a real axum `Router` via `tower::ServiceExt::oneshot`,
// exercising HTTP handlers end-to-end rather than calling the service layer
// directly. The presence store is swapped for an in-memory fake (no Redis in
// the test harness); persistence is a real in-memory sqlite database with
// migrations applied, same as `sqlite_repo_test.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use realtime_chat_core::ai::AiCoordinator;
use realtime_chat_core::auth::AuthService;
use realtime_chat_core::call::CallCoordinator;
use realtime_chat_core::config::ai::AiConfig;
use realtime_chat_core::config::auth::AuthConfig;
use realtime_chat_core::config::realtime::RealtimeConfig;
use realtime_chat_core::config::server::{DatabaseConfig, ServerConfig, StorageConfig};
use realtime_chat_core::config::Config;
use realtime_chat_core::domain::DomainResult;
use realtime_chat_core::notifications::NotificationService;
use realtime_chat_core::presence::PresenceStore;
use realtime_chat_core::registry::ConnectionRegistry;
use realtime_chat_core::repo::sqlite::{
    SqliteAttachmentRepository, SqliteBlockRepository, SqliteCallRepository, SqliteConversationRepository,
    SqliteMemberRepository, SqliteMessageRepository, SqliteNotificationRepository, SqliteReactionRepository, SqliteUserRepository,
};
use realtime_chat_core::state::AppState;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Mutex;
use tower::ServiceExt;

/// An in-memory stand-in for `RedisPresenceStore`, so HTTP auth tests don't
/// need a live Redis instance.
#[derive(Default)]
struct FakePresenceStore {
    refresh_tokens: Mutex<HashMap<String, String>>,
    online: Mutex<HashMap<String, bool>>,
}

#[async_trait]
impl PresenceStore for FakePresenceStore {
    async fn bind_refresh_token(&self, user_id: &str, token: &str, _ttl_seconds: i64) -> DomainResult<()> {
        self.refresh_tokens.lock().await.insert(user_id.to_string(), token.to_string());
        Ok(())
    }

    async fn check_refresh_token(&self, user_id: &str, token: &str) -> DomainResult<bool> {
        Ok(self.refresh_tokens.lock().await.get(user_id).map(|t| t == token).unwrap_or(false))
    }

    async fn revoke_refresh_token(&self, user_id: &str) -> DomainResult<()> {
        self.refresh_tokens.lock().await.remove(user_id);
        Ok(())
    }

    async fn mark_online(&self, user_id: &str) -> DomainResult<()> {
        self.online.lock().await.insert(user_id.to_string(), true);
        Ok(())
    }

    async fn mark_offline(&self, user_id: &str) -> DomainResult<()> {
        self.online.lock().await.insert(user_id.to_string(), false);
        Ok(())
    }

    async fn is_online(&self, user_id: &str) -> DomainResult<bool> {
        Ok(self.online.lock().await.get(user_id).copied().unwrap_or(false))
    }
}

async fn test_state() -> Arc<AppState> {
    let pool = SqlitePoolOptions::new().connect(":memory:").await.expect("in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("apply migrations");

    let config = Config {
        auth: AuthConfig {
            access_token_secret: "a".repeat(32),
            refresh_token_secret: "b".repeat(32),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 604_800,
            bcrypt_cost: 4,
        },
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0, frontend_url: "http://localhost:3000".to_string() },
        database: DatabaseConfig { url: "sqlite::memory:".to_string(), max_connections: 5 },
        storage: StorageConfig { kv_url: "redis://unused".to_string() },
        ai: AiConfig { api_key: None, model: "gpt-4o-mini".to_string(), base_url: "https://api.openai.com/v1".to_string() },
        realtime: RealtimeConfig {
            events_per_minute_per_connection: 100,
            handshake_timeout_seconds: 5,
            persistence_timeout_seconds: 5,
            upstream_call_timeout_seconds: 60,
            upstream_idle_timeout_seconds: 20,
            call_ring_timeout_seconds: 30,
            context_window_messages: 20,
            context_window_chars: 30_000,
        },
    };

    let users = Arc::new(SqliteUserRepository::new(pool.clone()));
    let conversations = Arc::new(SqliteConversationRepository::new(pool.clone()));
    let members = Arc::new(SqliteMemberRepository::new(pool.clone()));
    let messages = Arc::new(SqliteMessageRepository::new(pool.clone()));
    let attachments = Arc::new(SqliteAttachmentRepository::new(pool.clone()));
    let reactions = Arc::new(SqliteReactionRepository::new(pool.clone()));
    let calls = Arc::new(SqliteCallRepository::new(pool.clone()));
    let blocks = Arc::new(SqliteBlockRepository::new(pool.clone()));
    let notifications = Arc::new(SqliteNotificationRepository::new(pool.clone()));

    let presence: Arc<dyn PresenceStore> = Arc::new(FakePresenceStore::default());
    let registry = Arc::new(ConnectionRegistry::new());

    let auth_service = Arc::new(AuthService::new(users.clone(), presence.clone(), config.auth.clone()));
    let call_coordinator = Arc::new(CallCoordinator::new(
        calls.clone(),
        members.clone(),
        registry.clone(),
        std::time::Duration::from_secs(config.realtime.call_ring_timeout_seconds),
    ));
    let ai_coordinator = Arc::new(AiCoordinator::new(
        messages.clone(),
        registry.clone(),
        None,
        config.realtime.context_window_messages,
        config.realtime.context_window_chars,
        std::time::Duration::from_secs(config.realtime.upstream_call_timeout_seconds),
        std::time::Duration::from_secs(config.realtime.upstream_idle_timeout_seconds),
    ));
    let notification_service = Arc::new(NotificationService::new(notifications.clone(), registry.clone()));

    Arc::new(AppState {
        sqlite_pool: pool,
        config,
        users,
        conversations,
        members,
        messages,
        attachments,
        reactions,
        calls,
        blocks,
        notifications,
        presence,
        registry,
        auth_service,
        call_coordinator,
        ai_coordinator,
        notification_service,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.expect("collect body").to_bytes();
    serde_json::from_slice(&bytes).expect("valid json body")
}

#[tokio::test]
async fn signup_then_login_issues_tokens_and_me_reflects_the_bearer_token() {
    let state = test_state().await;
    let app = realtime_chat_core::http::router().with_state(state);

    let signup_body = json!({
        "email": "alice@example.com",
        "display_name": "Alice",
        "password": "correct horse battery staple",
    });

    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/signup")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(signup_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let signup_json = body_json(response).await;
    let access_token = signup_json["access_token"].as_str().expect("access_token present").to_string();

    let login_body = json!({ "email": "alice@example.com", "password": "correct horse battery staple" });
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/login")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(login_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::get("/auth/me")
                .header("authorization", format!("Bearer {access_token}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me_json = body_json(response).await;
    assert_eq!(me_json["email"], "alice@example.com");
}

#[tokio::test]
async fn login_with_wrong_password_is_rejected() {
    let state = test_state().await;
    let app = realtime_chat_core::http::router().with_state(state);

    let signup_body = json!({ "email": "bob@example.com", "display_name": "Bob", "password": "the right password" });
    app.clone()
        .oneshot(
            Request::post("/auth/signup")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(signup_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let login_body = json!({ "email": "bob@example.com", "password": "the wrong password" });
    let response = app
        .oneshot(
            Request::post("/auth/login")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(login_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_token_rotation_invalidates_the_previous_token() {
    let state = test_state().await;
    let app = realtime_chat_core::http::router().with_state(state);

    let signup_body = json!({ "email": "carol@example.com", "display_name": "Carol", "password": "another good password" });
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/signup")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(signup_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let signup_json = body_json(response).await;
    let user_id = signup_json["user"]["id"].as_str().unwrap().to_string();
    let first_refresh_token = signup_json["refresh_token"].as_str().unwrap().to_string();

    let refresh_body = json!({ "user_id": user_id, "refresh_token": first_refresh_token });
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/refresh")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(refresh_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Presenting the now-rotated-away first refresh token again must fail.
    let stale_refresh_body = json!({ "user_id": user_id, "refresh_token": first_refresh_token });
    let response = app
        .oneshot(
            Request::post("/auth/refresh")
                .header("content-type", "application/json")
                .body(axum::body::Body::from(stale_refresh_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
