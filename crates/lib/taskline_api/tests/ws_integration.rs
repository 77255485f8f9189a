//! Integration test — real websocket clients against a served router.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use common::TestApp;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use taskline_core::models::auth::Role;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(t: &TestApp) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = t.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, token: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect("handshake");
    ws
}

async fn next_event(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("event JSON");
        }
    }
}

/// Skip events until one of `kind` arrives.
async fn next_of(ws: &mut Client, kind: &str) -> Value {
    loop {
        let event = next_event(ws).await;
        if event["type"] == kind {
            return event;
        }
    }
}

async fn send(ws: &mut Client, event: Value) {
    ws.send(Message::text(event.to_string())).await.unwrap();
}

#[tokio::test]
async fn handshake_without_credential_is_rejected() {
    let t = TestApp::new();
    let addr = serve(&t).await;

    match connect_async(format!("ws://{addr}/ws")).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }
    match connect_async(format!("ws://{addr}/ws?token=garbage")).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status(), 401),
        other => panic!("expected 401, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn message_flows_between_connected_participants() {
    let t = TestApp::new();
    let p1 = t.seed("one@example.com", Role::Member, "password1").await;
    let p2 = t.seed("two@example.com", Role::Member, "password1").await;
    let conversation = t.store.add_conversation(&[p1, p2]).await;
    let room = format!("conversation:{conversation}");
    let addr = serve(&t).await;

    let mut c1 = connect(addr, &t.access_token(p1)).await;
    let joined = next_event(&mut c1).await;
    assert_eq!(joined, json!({"type": "joined-room", "room": format!("user:{p1}")}));

    let mut c2 = connect(addr, &t.access_token(p2)).await;
    next_of(&mut c2, "joined-room").await;

    for ws in [&mut c1, &mut c2] {
        send(ws, json!({"type": "join-room", "room": room})).await;
        let ack = next_of(ws, "joined-room").await;
        assert_eq!(ack["room"], room.as_str());
    }

    send(
        &mut c1,
        json!({"type": "send-message", "room": room, "content": "hi"}),
    )
    .await;

    let received = next_of(&mut c2, "new-message").await;
    assert_eq!(received["message"]["content"], "hi");
    assert_eq!(received["message"]["senderId"], p1);
    assert_eq!(received["message"]["room"], room.as_str());

    let notification = next_of(&mut c2, "notification").await;
    assert_eq!(notification["notification"]["type"], "message_received");

    let echoed = next_of(&mut c1, "new-message").await;
    assert_eq!(echoed["message"]["id"], received["message"]["id"]);
}

#[tokio::test]
async fn denied_join_keeps_socket_open() {
    let t = TestApp::new();
    let owner = t.seed("owner@example.com", Role::Member, "password1").await;
    let p3 = t.seed("three@example.com", Role::Member, "password1").await;
    let project = t
        .store
        .add_project(owner, taskline_core::store::memory::Visibility::Private, &[])
        .await;
    let addr = serve(&t).await;

    let mut ws = connect(addr, &t.access_token(p3)).await;
    next_of(&mut ws, "joined-room").await;

    send(&mut ws, json!({"type": "join-room", "room": format!("project:{project}")})).await;
    let err = next_of(&mut ws, "error").await;
    assert_eq!(err["code"], "room_access_denied");
    assert_eq!(err["retryable"], false);

    send(&mut ws, json!({"type": "typing-start"})).await;
    let err = next_of(&mut ws, "error").await;
    assert_eq!(err["code"], "validation_failed");

    // Still usable: joining the personal room again is allowed.
    send(&mut ws, json!({"type": "join-room", "room": format!("user:{p3}")})).await;
    next_of(&mut ws, "joined-room").await;
}

#[tokio::test]
async fn closing_last_socket_announces_offline() {
    let t = TestApp::new();
    let p4 = t.seed("four@example.com", Role::Member, "password1").await;
    let p5 = t.seed("five@example.com", Role::Member, "password1").await;
    let addr = serve(&t).await;

    let mut observer = connect(addr, &t.access_token(p5)).await;
    next_of(&mut observer, "joined-room").await;

    let mut leaving = connect(addr, &t.access_token(p4)).await;
    next_of(&mut leaving, "joined-room").await;
    let online = next_of(&mut observer, "presence-changed").await;
    assert_eq!(online["principalId"], p4);
    assert_eq!(online["status"], "online");

    leaving.close(None).await.unwrap();
    let offline = next_of(&mut observer, "presence-changed").await;
    assert_eq!(offline["principalId"], p4);
    assert_eq!(offline["status"], "offline");
    assert!(offline["lastSeenAt"].is_string());
}
