// src/state.rs
// Application state: composes repositories, the presence store, the
// connection registry, and the service layer behind a sequential
// `AppState::new` constructor.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use crate::ai::upstream::OpenAiCompatibleCompletion;
use crate::ai::AiCoordinator;
use crate::auth::AuthService;
use crate::call::CallCoordinator;
use crate::config::Config;
use crate::notifications::NotificationService;
use crate::presence::{PresenceStore, RedisPresenceStore};
use crate::registry::ConnectionRegistry;
use crate::repo::sqlite::{
    self, SqliteAttachmentRepository, SqliteBlockRepository, SqliteCallRepository, SqliteConversationRepository,
    SqliteMemberRepository, SqliteMessageRepository, SqliteNotificationRepository, SqliteReactionRepository, SqliteUserRepository,
};
use crate::repo::{
    AttachmentRepository, BlockRepository, CallRepository, ConversationRepository, MemberRepository, MessageRepository,
    NotificationRepository, ReactionRepository, UserRepository,
};

pub struct AppState {
    pub sqlite_pool: SqlitePool,
    pub config: Config,

    pub users: Arc<dyn UserRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub members: Arc<dyn MemberRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub attachments: Arc<dyn AttachmentRepository>,
    pub reactions: Arc<dyn ReactionRepository>,
    pub calls: Arc<dyn CallRepository>,
    pub blocks: Arc<dyn BlockRepository>,
    pub notifications: Arc<dyn NotificationRepository>,

    pub presence: Arc<dyn PresenceStore>,
    pub registry: Arc<ConnectionRegistry>,

    pub auth_service: Arc<AuthService>,
    pub call_coordinator: Arc<CallCoordinator>,
    pub ai_coordinator: Arc<AiCoordinator>,
    pub notification_service: Arc<NotificationService>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        info!("connecting to sqlite database");
        let sqlite_pool = sqlite::connect(&config.database.url).await?;

        info!("connecting to presence store");
        let presence: Arc<dyn PresenceStore> = Arc::new(RedisPresenceStore::connect(&config.storage.kv_url).await?);

        let users: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(sqlite_pool.clone()));
        let conversations: Arc<dyn ConversationRepository> = Arc::new(SqliteConversationRepository::new(sqlite_pool.clone()));
        let members: Arc<dyn MemberRepository> = Arc::new(SqliteMemberRepository::new(sqlite_pool.clone()));
        let messages: Arc<dyn MessageRepository> = Arc::new(SqliteMessageRepository::new(sqlite_pool.clone()));
        let attachments: Arc<dyn AttachmentRepository> = Arc::new(SqliteAttachmentRepository::new(sqlite_pool.clone()));
        let reactions: Arc<dyn ReactionRepository> = Arc::new(SqliteReactionRepository::new(sqlite_pool.clone()));
        let calls: Arc<dyn CallRepository> = Arc::new(SqliteCallRepository::new(sqlite_pool.clone()));
        let blocks: Arc<dyn BlockRepository> = Arc::new(SqliteBlockRepository::new(sqlite_pool.clone()));
        let notifications: Arc<dyn NotificationRepository> = Arc::new(SqliteNotificationRepository::new(sqlite_pool.clone()));

        let registry = Arc::new(ConnectionRegistry::new());

        info!("building service layer");
        let auth_service = Arc::new(AuthService::new(users.clone(), presence.clone(), config.auth.clone()));

        let call_coordinator = Arc::new(CallCoordinator::new(
            calls.clone(),
            members.clone(),
            registry.clone(),
            std::time::Duration::from_secs(config.realtime.call_ring_timeout_seconds),
        ));

        let upstream = config.ai.is_configured().then(|| {
            Arc::new(OpenAiCompatibleCompletion::new(
                config.ai.base_url.clone(),
                config.ai.api_key.clone().unwrap_or_default(),
                config.ai.model.clone(),
            )) as Arc<dyn crate::ai::upstream::UpstreamCompletion>
        });

        let ai_coordinator = Arc::new(AiCoordinator::new(
            messages.clone(),
            registry.clone(),
            upstream,
            config.realtime.context_window_messages,
            config.realtime.context_window_chars,
            std::time::Duration::from_secs(config.realtime.upstream_call_timeout_seconds),
            std::time::Duration::from_secs(config.realtime.upstream_idle_timeout_seconds),
        ));

        let notification_service = Arc::new(NotificationService::new(notifications.clone(), registry.clone()));

        info!("application state ready");
        Ok(Arc::new(Self {
            sqlite_pool,
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
        }))
    }
}
