//! WebSocket integration tests

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reelcollab::changes::ChangeFeed;
use reelcollab::models::ProfileSummary;
use reelcollab::retry::RetryPolicy;
use reelcollab::store::{ProfileDirectory, SqliteStore};
use reelcollab::{router, AppState};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn setup_server() -> (SocketAddr, SqliteStore) {
    let store = SqliteStore::connect("sqlite::memory:", 1)
        .await
        .expect("Failed to create in-memory database");
    store.migrate().await.expect("Failed to run migrations");

    let state = AppState::new(store.clone(), ChangeFeed::new(64), RetryPolicy::none());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, store)
}

async fn connect(addr: SocketAddr) -> Ws {
    let url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws_stream
}

async fn send_msg(ws: &mut Ws, msg: Value) {
    ws.send(Message::Text(msg.to_string())).await.unwrap();
}

async fn recv_msg(ws: &mut Ws) -> Value {
    let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("Timed out waiting for a message");
    match next {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected text message, got {:?}", other),
    }
}

/// Next message that is not a change signal
async fn recv_reply(ws: &mut Ws) -> Value {
    loop {
        let msg = recv_msg(ws).await;
        if msg["type"] != "collaborations_changed" {
            return msg;
        }
    }
}

/// Connect and identify as a user with a saved profile
async fn login(addr: SocketAddr, store: &SqliteStore, username: &str) -> (Ws, Uuid) {
    let user = Uuid::new_v4();
    store
        .upsert_profile(&ProfileSummary::new(user, username))
        .await
        .unwrap();

    let mut ws = connect(addr).await;
    send_msg(&mut ws, json!({"type": "identify", "user_id": user})).await;
    let reply = recv_msg(&mut ws).await;
    assert_eq!(reply["type"], "identified");
    (ws, user)
}

#[tokio::test]
async fn test_websocket_requires_identify() {
    let (addr, _store) = setup_server().await;
    let mut ws = connect(addr).await;

    send_msg(&mut ws, json!({"type": "list_inbox", "direction": "received"})).await;

    let reply = recv_msg(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "authorization_error");
    assert_eq!(reply["refetch"], false);
}

#[tokio::test]
async fn test_websocket_invalid_message() {
    let (addr, _store) = setup_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("not json".to_string())).await.unwrap();

    let reply = recv_msg(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["code"], "validation_error");
}

#[tokio::test]
async fn test_websocket_save_profile() {
    let (addr, store) = setup_server().await;
    let (mut ws, user) = login(addr, &store, "placeholder").await;

    send_msg(
        &mut ws,
        json!({
            "type": "save_profile",
            "username": "  gaffer_joe ",
            "avatar_url": "https://img/joe.png",
            "specialty": " lighting "
        }),
    )
    .await;
    let reply = recv_msg(&mut ws).await;
    assert_eq!(reply["type"], "profile_saved");
    assert_eq!(reply["profile"]["id"], user.to_string());
    assert_eq!(reply["profile"]["username"], "gaffer_joe");
    assert_eq!(reply["profile"]["specialty"], "lighting");

    let stored = store.get_profile(user).await.unwrap().unwrap();
    assert_eq!(stored.specialty.as_deref(), Some("lighting"));

    send_msg(&mut ws, json!({"type": "save_profile", "username": "   "})).await;
    let reply = recv_msg(&mut ws).await;
    assert_eq!(reply["code"], "validation_error");
}

#[tokio::test]
async fn test_websocket_full_flow() {
    let (addr, store) = setup_server().await;
    let (mut alice, _alice_id) = login(addr, &store, "alice").await;
    let (mut bob, bob_id) = login(addr, &store, "bob").await;

    send_msg(
        &mut alice,
        json!({
            "type": "create_request",
            "receiver_id": bob_id,
            "message": "Let's work together",
            "payment_amount": 200,
            "currency": "USD"
        }),
    )
    .await;
    let created = recv_reply(&mut alice).await;
    assert_eq!(created["type"], "request_created");
    assert_eq!(created["request"]["status"], "pending");
    assert_eq!(created["agreement"]["payment_amount"], 200);
    let request_id = created["request"]["id"].as_str().unwrap().to_string();

    // Bob is told something changed
    let signal = recv_msg(&mut bob).await;
    assert_eq!(signal["type"], "collaborations_changed");

    send_msg(
        &mut bob,
        json!({"type": "respond_to_request", "request_id": request_id, "decision": "accept"}),
    )
    .await;
    let updated = recv_reply(&mut bob).await;
    assert_eq!(updated["type"], "request_updated");
    assert_eq!(updated["request"]["status"], "accepted");

    // Accepting the request leaves the terms open
    send_msg(&mut bob, json!({"type": "list_inbox", "direction": "received"})).await;
    let inbox = recv_reply(&mut bob).await;
    let items = inbox["items"].as_array().unwrap();
    assert_eq!(items[0]["request"]["status"], "accepted");
    assert_eq!(items[0]["agreement"]["status"], "pending");

    send_msg(
        &mut bob,
        json!({"type": "respond_to_agreement", "request_id": request_id, "decision": "accept"}),
    )
    .await;
    let agreed = recv_reply(&mut bob).await;
    assert_eq!(agreed["type"], "agreement_updated");
    assert_eq!(agreed["agreement"]["status"], "accepted");

    send_msg(&mut alice, json!({"type": "list_inbox", "direction": "sent"})).await;
    let inbox = recv_reply(&mut alice).await;
    assert_eq!(inbox["type"], "inbox");
    let items = inbox["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["request"]["status"], "accepted");
    assert_eq!(items[0]["agreement"]["status"], "accepted");
    assert_eq!(items[0]["receiver"]["username"], "bob");
}

#[tokio::test]
async fn test_websocket_second_response_asks_for_refetch() {
    let (addr, store) = setup_server().await;
    let (mut alice, _) = login(addr, &store, "alice").await;
    let (mut bob, bob_id) = login(addr, &store, "bob").await;

    send_msg(
        &mut alice,
        json!({"type": "create_request", "receiver_id": bob_id}),
    )
    .await;
    let created = recv_reply(&mut alice).await;
    assert_eq!(created["agreement"]["payment_amount"], 50);
    assert_eq!(created["agreement"]["currency"], "USD");
    let request_id = created["request"]["id"].as_str().unwrap().to_string();

    for decision in ["decline", "accept"] {
        send_msg(
            &mut bob,
            json!({"type": "respond_to_request", "request_id": request_id, "decision": decision}),
        )
        .await;
    }

    let first = recv_reply(&mut bob).await;
    assert_eq!(first["request"]["status"], "declined");
    let second = recv_reply(&mut bob).await;
    assert_eq!(second["type"], "error");
    assert_eq!(second["code"], "invalid_state_error");
    assert_eq!(second["message"], "This request has already been resolved");
    assert_eq!(second["refetch"], true);
}

#[tokio::test]
async fn test_websocket_cancel_by_sender() {
    let (addr, store) = setup_server().await;
    let (mut alice, _) = login(addr, &store, "alice").await;
    let (mut bob, bob_id) = login(addr, &store, "bob").await;

    send_msg(
        &mut alice,
        json!({"type": "create_request", "receiver_id": bob_id, "message": "Need a sound mixer"}),
    )
    .await;
    let created = recv_reply(&mut alice).await;
    let request_id = created["request"]["id"].as_str().unwrap().to_string();

    send_msg(&mut bob, json!({"type": "cancel_request", "request_id": request_id})).await;
    let denied = recv_reply(&mut bob).await;
    assert_eq!(denied["code"], "authorization_error");

    send_msg(&mut alice, json!({"type": "cancel_request", "request_id": request_id})).await;
    let cancelled = recv_reply(&mut alice).await;
    assert_eq!(cancelled["type"], "request_cancelled");

    send_msg(&mut bob, json!({"type": "list_inbox", "direction": "received"})).await;
    let inbox = recv_reply(&mut bob).await;
    assert!(inbox["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_websocket_rejects_bad_terms() {
    let (addr, store) = setup_server().await;
    let (mut alice, _) = login(addr, &store, "alice").await;
    let bob_id = Uuid::new_v4();
    store
        .upsert_profile(&ProfileSummary::new(bob_id, "bob"))
        .await
        .unwrap();

    send_msg(
        &mut alice,
        json!({"type": "create_request", "receiver_id": bob_id, "payment_amount": 125, "currency": "USD"}),
    )
    .await;
    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["code"], "validation_error");

    send_msg(
        &mut alice,
        json!({"type": "create_request", "receiver_id": bob_id, "payment_amount": 100, "currency": "JPY"}),
    )
    .await;
    let reply = recv_reply(&mut alice).await;
    assert_eq!(reply["code"], "validation_error");

    send_msg(&mut alice, json!({"type": "list_inbox", "direction": "sent"})).await;
    let inbox = recv_reply(&mut alice).await;
    assert!(inbox["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_websocket_paged_inbox() {
    let (addr, store) = setup_server().await;
    let (mut alice, _) = login(addr, &store, "alice").await;
    let (_bob, bob_id) = login(addr, &store, "bob").await;

    for _ in 0..3 {
        send_msg(
            &mut alice,
            json!({"type": "create_request", "receiver_id": bob_id}),
        )
        .await;
        assert_eq!(recv_reply(&mut alice).await["type"], "request_created");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    send_msg(
        &mut alice,
        json!({"type": "list_inbox", "direction": "sent", "limit": 2}),
    )
    .await;
    let first = recv_reply(&mut alice).await;
    assert_eq!(first["items"].as_array().unwrap().len(), 2);
    let cursor = first["next_cursor"].clone();
    assert!(cursor.is_object());

    send_msg(
        &mut alice,
        json!({"type": "list_inbox", "direction": "sent", "limit": 2, "cursor": cursor}),
    )
    .await;
    let second = recv_reply(&mut alice).await;
    assert_eq!(second["items"].as_array().unwrap().len(), 1);
    assert!(second.get("next_cursor").is_none());
}

#[tokio::test]
async fn test_websocket_close() {
    let (addr, _store) = setup_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Close(None)).await.unwrap();

    // The reply varies with timing; closing must simply not panic
    let _ = ws.next().await;
}
