//! Storage-level integration tests against a real Postgres instance.
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test chat_flow_db_test -- --ignored

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use convo_server::migrations;
use convo_server::models::message::MessageType;
use convo_server::models::user::User;
use convo_server::services::conversation_service::ConversationService;
use convo_server::services::message_service::MessageService;
use convo_server::services::user_service::UserService;

const TEST_PASSWORD: &str = "SecurePass123!";

/// Bootstrap database connection pool for testing
async fn bootstrap_pool() -> Pool<Postgres> {
    let db_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL env var required for storage tests");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await
        .expect("failed to connect to DATABASE_URL");
    migrations::run_all(&pool).await.expect("migrations failed");
    pool
}

/// Register a throwaway user with a unique name and email.
async fn make_user(pool: &Pool<Postgres>) -> User {
    let tag = Uuid::new_v4().simple().to_string();
    let username = format!("u{}", &tag[..12]);
    let email = format!("{}@test.invalid", &tag[..12]);
    UserService::register(pool, &username, &email, TEST_PASSWORD)
        .await
        .expect("registration failed")
}

/// Remove everything a test created for a user pair.
async fn cleanup_pair(pool: &Pool<Postgres>, a: Uuid, b: Uuid) {
    let room_id = ConversationService::room_id(a, b);
    let _ = sqlx::query("DELETE FROM messages WHERE room_id = $1")
        .bind(&room_id)
        .execute(pool)
        .await;
    let _ = sqlx::query("DELETE FROM conversations WHERE room_id = $1")
        .bind(&room_id)
        .execute(pool)
        .await;
    for user_id in [a, b] {
        let _ = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(pool)
            .await;
    }
}

#[tokio::test]
#[ignore] // Run with: cargo test --test chat_flow_db_test -- --ignored
async fn test_concurrent_find_or_create_yields_one_row() {
    let pool = bootstrap_pool().await;
    let alice = make_user(&pool).await;
    let bob = make_user(&pool).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let (a, b) = (alice.id, bob.id);
        handles.push(tokio::spawn(async move {
            let mut conn = pool.acquire().await.expect("acquire failed");
            ConversationService::find_or_create(&mut conn, a, b)
                .await
                .expect("find_or_create failed")
                .id
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.expect("task panicked"));
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "every racer must resolve to the same row");

    let room_id = ConversationService::room_id(alice.id, bob.id);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE room_id = $1")
        .bind(&room_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    cleanup_pair(&pool, alice.id, bob.id).await;
}

#[tokio::test]
#[ignore]
async fn test_send_bumps_only_recipient_counter_and_mark_read_zeroes_it() {
    let pool = bootstrap_pool().await;
    let alice = make_user(&pool).await;
    let bob = make_user(&pool).await;
    let room_id = ConversationService::room_id(alice.id, bob.id);

    for text in ["first", "second"] {
        MessageService::send(
            &pool,
            alice.id,
            bob.id,
            Some(text.into()),
            MessageType::Text,
            None,
        )
        .await
        .expect("send failed");
    }

    let mut conn = pool.acquire().await.unwrap();
    let conv = ConversationService::get_by_room(&mut conn, &room_id)
        .await
        .unwrap()
        .expect("conversation missing after send");
    assert_eq!(conv.unread_for(bob.id), 2);
    assert_eq!(conv.unread_for(alice.id), 0, "sender counter must stay at zero");

    MessageService::mark_read(&pool, bob.id, alice.id)
        .await
        .expect("mark_read failed");

    let conv = ConversationService::get_by_room(&mut conn, &room_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conv.unread_for(bob.id), 0);

    let rows = sqlx::query("SELECT is_read, read_at FROM messages WHERE room_id = $1")
        .bind(&room_id)
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert!(row.get::<bool, _>("is_read"));
        assert!(row.get::<Option<chrono::DateTime<chrono::Utc>>, _>("read_at").is_some());
    }

    cleanup_pair(&pool, alice.id, bob.id).await;
}

#[tokio::test]
#[ignore]
async fn test_soft_deleted_messages_vanish_from_reads() {
    let pool = bootstrap_pool().await;
    let alice = make_user(&pool).await;
    let bob = make_user(&pool).await;

    let kept = MessageService::send(&pool, alice.id, bob.id, Some("keep".into()), MessageType::Text, None)
        .await
        .unwrap();
    let doomed = MessageService::send(&pool, alice.id, bob.id, Some("drop".into()), MessageType::Text, None)
        .await
        .unwrap();

    // Only the sender may delete
    let err = MessageService::soft_delete(&pool, doomed.id, bob.id).await;
    assert!(err.is_err());

    MessageService::soft_delete(&pool, doomed.id, alice.id)
        .await
        .expect("delete failed");

    let (messages, total) = MessageService::list_by_room(&pool, bob.id, alice.id, 1, 50)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, kept.id);

    // The row itself survives, flagged
    let row = sqlx::query("SELECT is_deleted, deleted_at FROM messages WHERE id = $1")
        .bind(doomed.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(row.get::<bool, _>("is_deleted"));
    assert!(row.get::<Option<chrono::DateTime<chrono::Utc>>, _>("deleted_at").is_some());

    // Editing a deleted message is a not-found, not a revival
    assert!(MessageService::edit(&pool, doomed.id, alice.id, "back").await.is_err());

    cleanup_pair(&pool, alice.id, bob.id).await;
}

#[tokio::test]
#[ignore]
async fn test_history_pages_are_disjoint_and_chronological() {
    let pool = bootstrap_pool().await;
    let alice = make_user(&pool).await;
    let bob = make_user(&pool).await;

    let mut sent = Vec::new();
    for i in 0..5 {
        let view = MessageService::send(
            &pool,
            alice.id,
            bob.id,
            Some(format!("message {i}")),
            MessageType::Text,
            None,
        )
        .await
        .unwrap();
        sent.push(view.id);
    }

    let mut seen = Vec::new();
    for page in 1..=3 {
        let (messages, total) = MessageService::list_by_room(&pool, bob.id, alice.id, page, 2)
            .await
            .unwrap();
        assert_eq!(total, 5);
        // Within a page, chronological order
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
        for m in &messages {
            assert!(!seen.contains(&m.id), "pages must be disjoint");
            seen.push(m.id);
        }
        let expected_len = if page == 3 { 1 } else { 2 };
        assert_eq!(messages.len(), expected_len);
    }
    assert_eq!(seen.len(), sent.len());
    for id in &sent {
        assert!(seen.contains(id));
    }

    cleanup_pair(&pool, alice.id, bob.id).await;
}

#[tokio::test]
#[ignore]
async fn test_end_to_end_chat_flow() {
    let pool = bootstrap_pool().await;
    let alice = make_user(&pool).await;
    let bob = make_user(&pool).await;

    // Credentials round-trip
    let logged_in = UserService::authenticate(&pool, &alice.email, TEST_PASSWORD)
        .await
        .expect("login failed");
    assert_eq!(logged_in.id, alice.id);
    assert!(UserService::authenticate(&pool, &alice.email, "WrongPass123!").await.is_err());

    let view = MessageService::send(
        &pool,
        alice.id,
        bob.id,
        Some("hello bob".into()),
        MessageType::Text,
        None,
    )
    .await
    .unwrap();
    assert_eq!(view.sender_name, alice.username);
    assert!(!view.is_read);

    // Bob's conversation list carries the preview and his unread count
    let (conversations, total) = ConversationService::list_for_user(&pool, bob.id, 1, 20)
        .await
        .unwrap();
    assert_eq!(total, 1);
    let summary = &conversations[0];
    assert_eq!(summary.contact.id, alice.id);
    assert_eq!(summary.unread_count, 1);
    assert_eq!(
        summary.last_message.as_ref().map(|m| m.content.as_str()),
        Some("hello bob")
    );

    // Edit touches content and the edited flag, nothing else
    let edited = MessageService::edit(&pool, view.id, alice.id, "hello again")
        .await
        .unwrap();
    assert_eq!(edited.content, "hello again");
    assert!(edited.is_edited);
    assert_eq!(edited.created_at, view.created_at);

    // Bob cannot edit alice's message
    assert!(MessageService::edit(&pool, view.id, bob.id, "hijack").await.is_err());

    MessageService::soft_delete(&pool, view.id, alice.id)
        .await
        .unwrap();
    let (messages, total) = MessageService::list_by_room(&pool, bob.id, alice.id, 1, 50)
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(messages.is_empty());

    cleanup_pair(&pool, alice.id, bob.id).await;
}
