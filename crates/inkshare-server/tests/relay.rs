//! End-to-end tests against a running relay server.
//!
//! Each test starts a real server on a free port and talks to it over HTTP
//! and WebSocket, the same way clients do.

use futures_util::{SinkExt, StreamExt};
use inkshare_core::{
    Brush, Channel, ClientMessage, Cursor, HttpStrokeLog, Identity, MemoryStrokeLog, NewStroke, PointerEvent, Point,
    RemoteHub, RoomId, RoomSession, ServerMessage, Stroke,
};
use inkshare_server::app;
use inkshare_server::state::AppState;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{Duration, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server on a free port, return its base URL.
async fn start_test_server() -> String {
    let port = free_port().await;
    let state = Arc::new(AppState::new(Arc::new(MemoryStrokeLog::new()), 64));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    // Give server time to start accepting
    sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}

fn stroke(author: &str, points: &[(f64, f64)]) -> NewStroke {
    NewStroke::new(
        author.into(),
        points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        Brush::pen("#ef4444", 4.0),
    )
}

async fn send(socket: &mut Socket, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    socket.send(Message::Text(json.into())).await.unwrap();
}

/// Next server message, skipping pings.
async fn recv(socket: &mut Socket) -> ServerMessage {
    loop {
        let msg = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn join(base: &str, room: &str, channel: Channel, identity: Option<Identity>) -> Socket {
    let ws_url = format!("{}/ws", base.replacen("http", "ws", 1));
    let (mut socket, _) = connect_async(ws_url).await.unwrap();
    send(
        &mut socket,
        &ClientMessage::Join {
            room: room.into(),
            channel,
            identity,
        },
    )
    .await;
    match recv(&mut socket).await {
        ServerMessage::Joined { channel: joined, .. } => assert_eq!(joined, channel),
        other => panic!("Expected Joined, got {other:?}"),
    }
    socket
}

fn cursors(msg: ServerMessage) -> Vec<Cursor> {
    match msg {
        ServerMessage::PresenceSync { cursors } => cursors,
        other => panic!("Expected PresenceSync, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rest_append_load_clear() {
    let base = start_test_server().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/rooms/main-room/strokes");

    let first = stroke("ann", &[(1.0, 1.0), (2.0, 2.0)]);
    let response = client.post(&url).json(&first).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let committed: Stroke = response.json().await.unwrap();
    assert_eq!(committed.id, first.id);

    let second = stroke("bob", &[(3.0, 3.0)]);
    client.post(&url).json(&second).send().await.unwrap();

    let strokes: Vec<Stroke> = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(strokes.len(), 2);
    assert_eq!(strokes[0].id, first.id);
    assert!(strokes[0].commit_order < strokes[1].commit_order);

    let response = client.delete(&url).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    let strokes: Vec<Stroke> = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert!(strokes.is_empty());
}

#[tokio::test]
async fn test_rest_rejects_empty_stroke() {
    let base = start_test_server().await;
    let response = reqwest::Client::new()
        .post(format!("{base}/rooms/main-room/strokes"))
        .json(&stroke("ann", &[]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_feed_delivers_inserts_and_clear() {
    let base = start_test_server().await;
    let mut feed = join(&base, "main-room", Channel::Strokes, None).await;
    let mut other_room = join(&base, "other-room", Channel::Strokes, None).await;

    let client = reqwest::Client::new();
    let url = format!("{base}/rooms/main-room/strokes");
    let new = stroke("ann", &[(5.0, 5.0), (6.0, 6.0)]);
    client.post(&url).json(&new).send().await.unwrap();

    match recv(&mut feed).await {
        ServerMessage::Inserted { stroke } => assert_eq!(stroke.id, new.id),
        other => panic!("Expected Inserted, got {other:?}"),
    }

    client.delete(&url).send().await.unwrap();
    assert_eq!(recv(&mut feed).await, ServerMessage::Cleared);

    // Nothing reached the other room.
    let quiet = timeout(Duration::from_millis(200), other_room.next()).await;
    assert!(quiet.is_err(), "Other room should not receive events");
}

#[tokio::test]
async fn test_presence_between_two_clients() {
    let base = start_test_server().await;
    let ann = Identity::new("ann", "Ann", "#06b6d4");
    let bob = Identity::new("bob", "Bob", "#f43f5e");

    let mut ann_socket = join(&base, "main-room", Channel::Cursors, Some(ann.clone())).await;
    assert_eq!(cursors(recv(&mut ann_socket).await).len(), 1);

    let mut bob_socket = join(&base, "main-room", Channel::Cursors, Some(bob.clone())).await;
    assert_eq!(cursors(recv(&mut ann_socket).await).len(), 2);
    assert_eq!(cursors(recv(&mut bob_socket).await).len(), 2);

    // Bob claims to move Ann's cursor; the server pins it to Bob.
    let moved = Cursor::at(&ann, 40.0, 50.0);
    send(&mut bob_socket, &ClientMessage::Cursor { cursor: moved }).await;
    let snapshot = cursors(recv(&mut ann_socket).await);
    let bob_cursor = snapshot.iter().find(|c| c.author_id == bob.author_id).unwrap();
    assert_eq!((bob_cursor.x, bob_cursor.y), (40.0, 50.0));
    let ann_cursor = snapshot.iter().find(|c| c.author_id == ann.author_id).unwrap();
    assert_eq!((ann_cursor.x, ann_cursor.y), (0.0, 0.0));

    bob_socket.close(None).await.unwrap();
    let snapshot = cursors(recv(&mut ann_socket).await);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].author_id, ann.author_id);
}

#[tokio::test]
async fn test_cursors_join_requires_identity() {
    let base = start_test_server().await;
    let ws_url = format!("{}/ws", base.replacen("http", "ws", 1));
    let (mut socket, _) = connect_async(ws_url).await.unwrap();
    send(
        &mut socket,
        &ClientMessage::Join {
            room: "main-room".into(),
            channel: Channel::Cursors,
            identity: None,
        },
    )
    .await;
    assert!(matches!(recv(&mut socket).await, ServerMessage::Error { .. }));
}

/// Pump until `done` holds or two seconds pass.
async fn pump_until(session: &mut RoomSession, done: impl Fn(&RoomSession) -> bool) {
    let wait = async {
        while !done(session) {
            session.pump();
            sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(Duration::from_secs(2), wait).await.expect("session did not converge");
}

#[tokio::test]
async fn test_two_sessions_converge() {
    let base = start_test_server().await;
    let log = HttpStrokeLog::new(&base).unwrap();
    let hub = RemoteHub::new(&base).unwrap();
    let room = RoomId::from("main-room");

    let mut ann = RoomSession::enter(
        room.clone(),
        Identity::new("ann", "Ann", "#06b6d4"),
        Brush::pen("#ef4444", 4.0),
        &log,
        &hub,
        &hub,
    )
    .await;
    let mut bob = RoomSession::enter(
        room.clone(),
        Identity::new("bob", "Bob", "#f43f5e"),
        Brush::eraser(16.0),
        &log,
        &hub,
        &hub,
    )
    .await;
    assert!(ann.take_errors().is_empty());
    assert!(bob.take_errors().is_empty());

    // Ann draws, Bob erases on top.
    ann.handle_pointer(PointerEvent::Down { position: Point::new(10.0, 10.0) });
    ann.handle_pointer(PointerEvent::Move { position: Point::new(50.0, 50.0) });
    let commit = ann.handle_pointer(PointerEvent::Up).unwrap();
    let committed = commit.send(&log).await;
    ann.apply_commit(committed);

    bob.handle_pointer(PointerEvent::Down { position: Point::new(30.0, 30.0) });
    let commit = bob.handle_pointer(PointerEvent::Up).unwrap();
    let committed = commit.send(&log).await;
    bob.apply_commit(committed);

    pump_until(&mut ann, |s| s.history().len() == 2 && s.remote_cursors().len() == 1).await;
    pump_until(&mut bob, |s| s.history().len() == 2).await;

    let ann_ids: Vec<_> = ann.history().iter().map(|s| s.id).collect();
    let bob_ids: Vec<_> = bob.history().iter().map(|s| s.id).collect();
    assert_eq!(ann_ids, bob_ids);
    assert!(ann.take_errors().is_empty());

    // Bob clears the room for everyone.
    let cleared = bob.clear_request().send(&log).await;
    bob.apply_clear(cleared);
    pump_until(&mut bob, |s| s.history().is_empty()).await;
    pump_until(&mut ann, |s| s.history().is_empty()).await;

    bob.leave();
    pump_until(&mut ann, |s| s.remote_cursors().is_empty()).await;
    ann.leave();
}
