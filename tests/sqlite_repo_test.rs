// tests/sqlite_repo_test.rs
// Persistence invariants that matter beyond plain CRUD: the AI_CHAT
// edit-cascade-delete transaction and reaction toggle semantics. Runs
// against a real in-memory sqlite database with migrations applied
// (`SqlitePoolOptions::connect(":memory:")` + `sqlx::migrate!`).

use std::time::Duration;

use realtime_chat_core::domain::MessageType;
use realtime_chat_core::repo::sqlite::{
    SqliteConversationRepository, SqliteMessageRepository, SqliteReactionRepository, SqliteUserRepository,
};
use realtime_chat_core::repo::{ConversationRepository, MessageRepository, NewMessage, ReactionRepository, UserRepository};
use sqlx::sqlite::SqlitePoolOptions;

async fn test_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new().connect(":memory:").await.expect("in-memory sqlite");
    sqlx::migrate!("./migrations").run(&pool).await.expect("apply migrations");
    pool
}

#[tokio::test]
async fn editing_a_message_in_an_ai_chat_drops_everything_after_it() {
    let pool = test_pool().await;
    let users = SqliteUserRepository::new(pool.clone());
    let conversations = SqliteConversationRepository::new(pool.clone());
    let messages = SqliteMessageRepository::new(pool.clone());

    let owner = users.create("owner@example.com", "Owner", "hash").await.unwrap();
    let conversation = conversations.create_ai_chat(&owner.id, None, None).await.unwrap();

    let prompt = messages
        .create(NewMessage {
            conversation_id: conversation.id.clone(),
            sender_id: Some(owner.id.clone()),
            kind: MessageType::Text,
            content: "first prompt".to_string(),
            reply_to_id: None,
            token_count: 3,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let response = messages.persist_ai_response(&conversation.id, "first reply", 3).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let second_prompt = messages
        .create(NewMessage {
            conversation_id: conversation.id.clone(),
            sender_id: Some(owner.id.clone()),
            kind: MessageType::Text,
            content: "second prompt".to_string(),
            reply_to_id: None,
            token_count: 3,
        })
        .await
        .unwrap();

    let (edited, dropped) = messages.edit_ai_chat_cascading(&prompt.id, "edited first prompt").await.unwrap();

    assert_eq!(edited.content, "edited first prompt");
    assert!(edited.is_edited);

    let dropped_ids: Vec<_> = dropped.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(dropped_ids, vec![response.id.as_str(), second_prompt.id.as_str()]);

    assert!(messages.find_by_id(&response.id).await.unwrap().is_none());
    assert!(messages.find_by_id(&second_prompt.id).await.unwrap().is_none());
    assert!(messages.find_by_id(&prompt.id).await.unwrap().is_some());
}

#[tokio::test]
async fn reacting_twice_with_the_same_emoji_toggles_it_off() {
    let pool = test_pool().await;
    let users = SqliteUserRepository::new(pool.clone());
    let conversations = SqliteConversationRepository::new(pool.clone());
    let messages = SqliteMessageRepository::new(pool.clone());
    let reactions = SqliteReactionRepository::new(pool.clone());

    let alice = users.create("alice@example.com", "Alice", "hash").await.unwrap();
    let bob = users.create("bob@example.com", "Bob", "hash").await.unwrap();
    let conversation = conversations.find_or_create_direct(&alice.id, &bob.id).await.unwrap();

    let message = messages
        .create(NewMessage {
            conversation_id: conversation.id.clone(),
            sender_id: Some(alice.id.clone()),
            kind: MessageType::Text,
            content: "hello".to_string(),
            reply_to_id: None,
            token_count: 1,
        })
        .await
        .unwrap();

    let after_first = reactions.toggle(&message.id, &bob.id, "👍").await.unwrap();
    assert_eq!(after_first.len(), 1);
    assert_eq!(after_first[0].emoji, "👍");

    let after_second = reactions.toggle(&message.id, &bob.id, "👍").await.unwrap();
    assert!(after_second.is_empty());
}
