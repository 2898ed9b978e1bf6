// src/repo/sqlite/mod.rs
// sqlx-backed repository implementations. Queries are written by hand
// (no query builder / ORM), matching how the rest of the corpus talks to
// SQLite.

mod attachments;
mod blocks;
mod calls;
mod conversations;
mod members;
mod messages;
mod notifications;
mod reactions;
mod users;

pub use attachments::SqliteAttachmentRepository;
pub use blocks::SqliteBlockRepository;
pub use calls::SqliteCallRepository;
pub use conversations::SqliteConversationRepository;
pub use members::SqliteMemberRepository;
pub use messages::SqliteMessageRepository;
pub use notifications::SqliteNotificationRepository;
pub use reactions::SqliteReactionRepository;
pub use users::SqliteUserRepository;

use sqlx::SqlitePool;

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Connects to the sqlite database at `database_url` and applies pending
/// migrations, matching `sqlx::migrate!` usage elsewhere in the corpus.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(10).connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
