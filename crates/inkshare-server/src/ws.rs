//! WebSocket change-feed and presence channels.
//!
//! A connection joins one channel of one room:
//! ```json
//! { "type": "join", "room": "main-room", "channel": "strokes" }
//! { "type": "join", "room": "main-room", "channel": "cursors", "identity": { ... } }
//! { "type": "cursor", "cursor": { "author_id": "...", "x": 10, "y": 20, ... } }
//! ```
//! The strokes channel receives `inserted` and `cleared`, the cursors channel
//! receives `presence_sync` with the complete cursor map after every change.

use crate::state::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use inkshare_core::{AuthorId, Channel, ClientMessage, RoomId, ServerMessage};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Channel membership of a connection.
struct Joined {
    room: RoomId,
    /// Set on the cursors channel.
    author: Option<AuthorId>,
    rx: broadcast::Receiver<ServerMessage>,
}

impl Joined {
    fn channel(&self) -> Channel {
        if self.author.is_some() { Channel::Cursors } else { Channel::Strokes }
    }
}

fn leave(state: &AppState, joined: Joined) {
    let Joined { room, author, rx } = joined;
    drop(rx);
    match author {
        Some(author) => state.leave_presence(&room, &author),
        None => state.remove_if_idle(&room),
    }
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize {:?}: {}", msg, e);
            true
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = Uuid::new_v4();
    info!("New connection: {}", conn_id);

    let (mut sender, mut receiver) = socket.split();
    let mut joined: Option<Joined> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!("Invalid message from {}: {}", conn_id, e);
                                let err = ServerMessage::Error { message: format!("Invalid message: {}", e) };
                                if !send(&mut sender, &err).await {
                                    break;
                                }
                                continue;
                            }
                        };

                        match client_msg {
                            ClientMessage::Join { room, channel, identity } => {
                                if let Some(old) = joined.take() {
                                    leave(&state, old);
                                }
                                let membership = match (channel, identity) {
                                    (Channel::Strokes, _) => Joined {
                                        rx: state.subscribe_strokes(&room),
                                        room: room.clone(),
                                        author: None,
                                    },
                                    (Channel::Cursors, Some(identity)) => Joined {
                                        rx: state.join_presence(&room, &identity),
                                        room: room.clone(),
                                        author: Some(identity.author_id),
                                    },
                                    (Channel::Cursors, None) => {
                                        let err = ServerMessage::Error {
                                            message: "Joining cursors requires an identity".to_string(),
                                        };
                                        if !send(&mut sender, &err).await {
                                            break;
                                        }
                                        continue;
                                    }
                                };
                                joined = Some(membership);

                                if !send(&mut sender, &ServerMessage::Joined { room: room.clone(), channel }).await {
                                    break;
                                }
                                info!("Connection {} joined {} of room {}", conn_id, channel, room);
                            }
                            ClientMessage::Leave => {
                                if let Some(old) = joined.take() {
                                    info!("Connection {} left room {}", conn_id, old.room);
                                    leave(&state, old);
                                }
                            }
                            ClientMessage::Cursor { mut cursor } => {
                                match &joined {
                                    Some(Joined { room, author: Some(author), .. }) => {
                                        // A connection only moves its own cursor.
                                        cursor.author_id = author.clone();
                                        state.update_cursor(room, cursor);
                                    }
                                    _ => debug!("Cursor from {} outside a cursors channel", conn_id),
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary, ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn_id, e);
                        break;
                    }
                }
            }

            msg = async {
                match &mut joined {
                    Some(membership) => membership.rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match msg {
                    Ok(server_msg) => {
                        if !send(&mut sender, &server_msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        let Some(membership) = &joined else { continue };
                        if membership.channel() == Channel::Cursors {
                            // The next snapshot supersedes everything missed.
                            debug!("Connection {} skipped {} presence snapshots", conn_id, missed);
                            continue;
                        }
                        // Missed inserts cannot be replayed here; the client reloads.
                        warn!("Connection {} lagged {} stroke events, closing", conn_id, missed);
                        let err = ServerMessage::Error {
                            message: format!("Lagged behind by {} events, reload the room", missed),
                        };
                        let _ = send(&mut sender, &err).await;
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    if let Some(membership) = joined.take() {
        leave(&state, membership);
    }
    info!("Connection closed: {}", conn_id);
}
