//! End-to-end tests for the chat core, driven through the event router with
//! channel-backed connections standing in for websockets.

use std::time::Duration;

use serde_json::Value;
use softvoices::auth::Identity;
use softvoices::chat::protocol::{ClientEvent, SendMessage};
use softvoices::chat::{derive_private_room, handle_event, ConnCtx, Hub, GENERAL_ROOM};
use softvoices::store::{init_schema, MessageKind, MessageStore, NewMessage};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::mpsc::{self, UnboundedReceiver};

async fn make_store() -> (MessageStore, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    (MessageStore::new(pool.clone(), Duration::from_secs(5)), pool)
}

fn connect(hub: &Hub, id: &str, username: &str) -> (ConnCtx, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let identity = Identity { id: id.to_string(), username: username.to_string() };
    (hub.connect(identity, tx), rx)
}

/// Everything delivered so far, parsed. Delivery is synchronous once
/// `handle_event` returns, so there is nothing to wait for.
fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

fn payloads<'a>(frames: &'a [Value], event: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["event"] == event).map(|f| &f["data"]).collect()
}

fn join(room: &str) -> ClientEvent {
    ClientEvent::JoinRoom { room_id: room.to_string() }
}

fn send_text(room: &str, text: &str, receiver: Option<&str>) -> ClientEvent {
    ClientEvent::SendMessage(SendMessage {
        room_id: room.to_string(),
        text: text.to_string(),
        kind: MessageKind::Text,
        file_url: None,
        receiver_id: receiver.map(str::to_string),
    })
}

#[tokio::test]
async fn send_reaches_exactly_the_room_members() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    let (_u3, mut rx3) = connect(&hub, "u3", "carol");

    handle_event(&hub, &store, &u1, join(GENERAL_ROOM)).await;
    handle_event(&hub, &store, &u2, join(GENERAL_ROOM)).await;
    drain(&mut rx1);
    drain(&mut rx2);
    drain(&mut rx3);

    handle_event(&hub, &store, &u1, send_text(GENERAL_ROOM, "hi", None)).await;

    for rx in [&mut rx1, &mut rx2] {
        let frames = drain(rx);
        let received = payloads(&frames, "receive_message");
        assert_eq!(received.len(), 1, "each member gets the message exactly once");
        assert_eq!(received[0]["text"], "hi");
        assert_eq!(received[0]["senderId"], "u1");
        assert_eq!(received[0]["senderName"], "alice");
        assert_eq!(received[0]["roomId"], GENERAL_ROOM);
    }

    // carol never joined general.
    assert!(payloads(&drain(&mut rx3), "receive_message").is_empty());
}

#[tokio::test]
async fn broadcast_order_matches_persisted_order() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    handle_event(&hub, &store, &u1, join(GENERAL_ROOM)).await;
    handle_event(&hub, &store, &u2, join(GENERAL_ROOM)).await;
    drain(&mut rx1);
    drain(&mut rx2);

    for text in ["first", "second", "third"] {
        handle_event(&hub, &store, &u1, send_text(GENERAL_ROOM, text, None)).await;
    }

    let frames = drain(&mut rx2);
    let received = payloads(&frames, "receive_message");
    let texts: Vec<&str> = received.iter().map(|m| m["text"].as_str().unwrap()).collect();
    assert_eq!(texts, ["first", "second", "third"]);

    let history = store.recent_history(GENERAL_ROOM, 50).await.unwrap();
    let persisted: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(persisted, ["first", "second", "third"]);
}

#[tokio::test]
async fn join_loads_the_newest_fifty_oldest_first() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    for i in 1..=60 {
        store
            .append(NewMessage {
                room_id: GENERAL_ROOM.to_string(),
                sender_id: "u1".to_string(),
                sender_name: "alice".to_string(),
                receiver_id: None,
                text: format!("msg-{i}"),
                kind: MessageKind::Text,
                file_url: None,
            })
            .await
            .unwrap();
    }

    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    drain(&mut rx2);
    handle_event(&hub, &store, &u2, join(GENERAL_ROOM)).await;

    let frames = drain(&mut rx2);
    let history = payloads(&frames, "load_history");
    assert_eq!(history.len(), 1, "history goes to the requester only, once");
    let messages = history[0].as_array().unwrap();
    assert_eq!(messages.len(), 50);
    assert_eq!(messages[0]["text"], "msg-11");
    assert_eq!(messages[49]["text"], "msg-60");
}

#[tokio::test]
async fn private_room_flow_delivers_message_and_notification() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    let room = derive_private_room("alice-id", "bob-id");
    assert_eq!(room, derive_private_room("bob-id", "alice-id"));

    let (alice, mut rx_a) = connect(&hub, "alice-id", "alice");
    let (bob, mut rx_b) = connect(&hub, "bob-id", "bob");
    handle_event(&hub, &store, &alice, join(&room)).await;
    handle_event(&hub, &store, &bob, join(&room)).await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    handle_event(&hub, &store, &alice, send_text(&room, "psst", Some("bob-id"))).await;

    let bob_frames = drain(&mut rx_b);
    let received = payloads(&bob_frames, "receive_message");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["text"], "psst");
    assert_eq!(received[0]["receiverId"], "bob-id");

    // The personal-room side channel fires because the chat room is private.
    let notified = payloads(&bob_frames, "private_message_notification");
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0]["senderId"], "alice-id");
    assert_eq!(notified[0]["senderName"], "alice");
    assert_eq!(notified[0]["message"]["text"], "psst");

    // The sender sees the room broadcast but no notification.
    let alice_frames = drain(&mut rx_a);
    assert_eq!(payloads(&alice_frames, "receive_message").len(), 1);
    assert!(payloads(&alice_frames, "private_message_notification").is_empty());
}

#[tokio::test]
async fn no_private_notification_in_the_general_room() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    handle_event(&hub, &store, &u1, join(GENERAL_ROOM)).await;
    handle_event(&hub, &store, &u2, join(GENERAL_ROOM)).await;
    drain(&mut rx1);
    drain(&mut rx2);

    handle_event(&hub, &store, &u1, send_text(GENERAL_ROOM, "hi all", Some("u2"))).await;

    let frames = drain(&mut rx2);
    assert_eq!(payloads(&frames, "receive_message").len(), 1);
    assert!(payloads(&frames, "private_message_notification").is_empty());
}

#[tokio::test]
async fn typing_indicators_reach_other_members_only() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    let (u3, mut rx3) = connect(&hub, "u3", "carol");
    for ctx in [&u1, &u2, &u3] {
        handle_event(&hub, &store, ctx, join(GENERAL_ROOM)).await;
    }
    drain(&mut rx1);
    drain(&mut rx2);
    drain(&mut rx3);

    handle_event(&hub, &store, &u1, ClientEvent::TypingStart { room_id: GENERAL_ROOM.to_string() })
        .await;

    assert!(payloads(&drain(&mut rx1), "user_typing").is_empty(), "no echo to the typist");
    for rx in [&mut rx2, &mut rx3] {
        let frames = drain(rx);
        let typing = payloads(&frames, "user_typing");
        assert_eq!(typing.len(), 1);
        assert_eq!(typing[0]["userId"], "u1");
        assert_eq!(typing[0]["username"], "alice");
    }

    handle_event(&hub, &store, &u1, ClientEvent::TypingStop { room_id: GENERAL_ROOM.to_string() })
        .await;

    let frames = drain(&mut rx2);
    let stopped = payloads(&frames, "user_stopped_typing");
    assert_eq!(stopped.len(), 1);
    assert_eq!(*stopped[0], Value::String("u1".to_string()));
}

#[tokio::test]
async fn leaving_a_room_stops_delivery() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    handle_event(&hub, &store, &u1, join(GENERAL_ROOM)).await;
    handle_event(&hub, &store, &u2, join(GENERAL_ROOM)).await;

    handle_event(&hub, &store, &u2, ClientEvent::LeaveRoom { room_id: GENERAL_ROOM.to_string() })
        .await;
    drain(&mut rx1);
    drain(&mut rx2);

    handle_event(&hub, &store, &u1, send_text(GENERAL_ROOM, "anyone?", None)).await;
    assert!(payloads(&drain(&mut rx2), "receive_message").is_empty());
    assert_eq!(payloads(&drain(&mut rx1), "receive_message").len(), 1);
}

#[tokio::test]
async fn store_failure_drops_the_send_and_keeps_serving() {
    let (store, pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    handle_event(&hub, &store, &u1, join(GENERAL_ROOM)).await;
    handle_event(&hub, &store, &u2, join(GENERAL_ROOM)).await;
    drain(&mut rx1);
    drain(&mut rx2);

    pool.close().await;

    handle_event(&hub, &store, &u1, send_text(GENERAL_ROOM, "lost", None)).await;
    assert!(payloads(&drain(&mut rx1), "receive_message").is_empty());
    assert!(payloads(&drain(&mut rx2), "receive_message").is_empty());

    // Unrelated events still flow: the failure stayed scoped to that send.
    handle_event(&hub, &store, &u1, ClientEvent::TypingStart { room_id: GENERAL_ROOM.to_string() })
        .await;
    assert_eq!(payloads(&drain(&mut rx2), "user_typing").len(), 1);
}

#[tokio::test]
async fn malformed_send_is_dropped_without_side_effects() {
    let (store, _pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    let (u2, mut rx2) = connect(&hub, "u2", "bob");
    handle_event(&hub, &store, &u1, join(GENERAL_ROOM)).await;
    handle_event(&hub, &store, &u2, join(GENERAL_ROOM)).await;
    drain(&mut rx1);
    drain(&mut rx2);

    handle_event(&hub, &store, &u1, send_text(GENERAL_ROOM, "   ", None)).await;

    assert!(payloads(&drain(&mut rx2), "receive_message").is_empty());
    assert!(store.recent_history(GENERAL_ROOM, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn presence_follows_connections_across_devices() {
    let (_store, _pool) = make_store().await;
    let hub = Hub::new();

    let (u1, mut rx1) = connect(&hub, "u1", "alice");
    drain(&mut rx1);

    // Bob opens two tabs; the online list still names him once.
    let (bob_tab1, _rx_b1) = connect(&hub, "u2", "bob");
    let (bob_tab2, _rx_b2) = connect(&hub, "u2", "bob");

    let frames = drain(&mut rx1);
    let lists = payloads(&frames, "get_online_users");
    assert_eq!(lists.len(), 2, "every connect announces presence");
    let last = lists.last().unwrap().as_array().unwrap();
    assert_eq!(last.len(), 2);

    // Closing one tab keeps him online; closing the last takes him off.
    hub.disconnect(&bob_tab1);
    assert!(hub.presence().is_online("u2"));
    hub.disconnect(&bob_tab2);
    assert!(!hub.presence().is_online("u2"));

    let frames = drain(&mut rx1);
    let lists = payloads(&frames, "get_online_users");
    let last = lists.last().unwrap().as_array().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0]["id"], "u1");

    hub.disconnect(&u1);
    assert!(hub.online_users().is_empty());
}
