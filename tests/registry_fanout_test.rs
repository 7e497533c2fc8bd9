use axum::extract::ws::Message;
use convo_server::websocket::ConnectionRegistry;
use uuid::Uuid;

fn text(s: &str) -> Message {
    Message::Text(s.to_string())
}

#[tokio::test]
async fn test_send_to_user_reaches_every_device() {
    let registry = ConnectionRegistry::new();
    let user = Uuid::new_v4();

    let (_c1, _, mut rx1) = registry.connect(user).await;
    let (_c2, _, mut rx2) = registry.connect(user).await;
    assert_eq!(registry.connection_count(user).await, 2);

    registry.send_to_user(user, text("hello")).await;

    assert!(matches!(rx1.recv().await, Some(Message::Text(t)) if t == "hello"));
    assert!(matches!(rx2.recv().await, Some(Message::Text(t)) if t == "hello"));
}

#[tokio::test]
async fn test_send_to_unknown_user_is_noop() {
    let registry = ConnectionRegistry::new();
    registry.send_to_user(Uuid::new_v4(), text("nobody home")).await;
}

#[tokio::test]
async fn test_room_broadcast_skips_origin() {
    let registry = ConnectionRegistry::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (alice_conn, _, mut alice_rx) = registry.connect(alice).await;
    let (bob_conn, _, mut bob_rx) = registry.connect(bob).await;

    registry.join_room("room-1", alice_conn).await;
    registry.join_room("room-1", bob_conn).await;

    registry
        .broadcast_room("room-1", text("typing"), Some(alice_conn))
        .await;

    assert!(matches!(bob_rx.recv().await, Some(Message::Text(t)) if t == "typing"));
    assert!(alice_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_room_and_user_union_delivers_once() {
    let registry = ConnectionRegistry::new();
    let recipient = Uuid::new_v4();

    // Device A has the chat open (in the room), device B does not
    let (conn_a, _, mut rx_a) = registry.connect(recipient).await;
    let (_conn_b, _, mut rx_b) = registry.connect(recipient).await;
    registry.join_room("room-1", conn_a).await;

    registry
        .send_to_room_and_user("room-1", recipient, text("new message"))
        .await;

    assert!(matches!(rx_a.recv().await, Some(Message::Text(t)) if t == "new message"));
    assert!(rx_a.try_recv().is_err(), "device in both sets got a duplicate");
    assert!(matches!(rx_b.recv().await, Some(Message::Text(t)) if t == "new message"));
}

#[tokio::test]
async fn test_join_room_ignores_unknown_connection() {
    let registry = ConnectionRegistry::new();
    let user = Uuid::new_v4();
    let (conn, _, mut rx) = registry.connect(user).await;

    registry.join_room("room-1", conn).await;
    registry.join_room("room-1", 9999).await;

    registry.broadcast_room("room-1", text("ping"), None).await;
    assert!(matches!(rx.recv().await, Some(Message::Text(t)) if t == "ping"));
}

#[tokio::test]
async fn test_connect_reports_first_connection_exactly_once() {
    let registry = ConnectionRegistry::new();
    let user = Uuid::new_v4();

    let (c1, first1, _rx1) = registry.connect(user).await;
    let (c2, first2, _rx2) = registry.connect(user).await;
    assert!(first1);
    assert!(!first2, "second device must not re-announce presence");

    // After the last connection drops, the next connect is first again
    registry.disconnect(user, c1).await;
    registry.disconnect(user, c2).await;
    let (_c3, first3, _rx3) = registry.connect(user).await;
    assert!(first3);
}

#[tokio::test]
async fn test_concurrent_connects_see_one_first_flag() {
    let registry = ConnectionRegistry::new();
    let user = Uuid::new_v4();

    // Two devices racing to connect: the flag is decided inside the
    // registry lock, so exactly one task observes it.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let (_conn, was_first, _rx) = registry.connect(user).await;
            was_first
        }));
    }
    let mut firsts = 0;
    for handle in handles {
        if handle.await.unwrap() {
            firsts += 1;
        }
    }
    assert_eq!(firsts, 1);
}

#[tokio::test]
async fn test_disconnect_reports_last_connection() {
    let registry = ConnectionRegistry::new();
    let user = Uuid::new_v4();

    let (c1, _, _rx1) = registry.connect(user).await;
    let (c2, _, _rx2) = registry.connect(user).await;

    assert!(!registry.disconnect(user, c1).await);
    assert!(registry.is_online(user).await);

    assert!(registry.disconnect(user, c2).await);
    assert!(!registry.is_online(user).await);
    assert_eq!(registry.connection_count(user).await, 0);
}

#[tokio::test]
async fn test_dead_connections_are_pruned_on_send() {
    let registry = ConnectionRegistry::new();
    let user = Uuid::new_v4();

    let (_c1, _, rx1) = registry.connect(user).await;
    let (_c2, _, mut rx2) = registry.connect(user).await;

    // First device goes away without a clean disconnect
    drop(rx1);

    registry.send_to_user(user, text("still here?")).await;
    assert!(matches!(rx2.recv().await, Some(Message::Text(t)) if t == "still here?"));

    // The dead channel was dropped from the user's connection set
    assert_eq!(registry.connection_count(user).await, 1);
}

#[tokio::test]
async fn test_broadcast_all_excludes_one_user() {
    let registry = ConnectionRegistry::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let carol = Uuid::new_v4();

    let (_ac, _, mut alice_rx) = registry.connect(alice).await;
    let (_bc, _, mut bob_rx) = registry.connect(bob).await;
    let (_cc, _, mut carol_rx) = registry.connect(carol).await;

    registry.broadcast_all(text("alice is online"), Some(alice)).await;

    assert!(alice_rx.try_recv().is_err());
    assert!(matches!(bob_rx.recv().await, Some(Message::Text(t)) if t == "alice is online"));
    assert!(matches!(carol_rx.recv().await, Some(Message::Text(t)) if t == "alice is online"));
}
