//! WebSocket protocol and client for the relay server.
//!
//! A socket joins exactly one channel of one room. The strokes channel
//! carries change-feed notifications, the cursors channel carries presence
//! snapshots and cursor publishes.

use crate::error::Channel;
use crate::model::{Identity, RoomId, Stroke};
use crate::presence::Cursor;
use serde::{Deserialize, Serialize};

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a channel of a room. Presence joins must carry an identity.
    Join {
        room: RoomId,
        channel: Channel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<Identity>,
    },
    /// Leave the joined channel
    Leave,
    /// Publish the local cursor (cursors channel only)
    Cursor { cursor: Cursor },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm the join. Notifications for the channel follow from here on.
    Joined { room: RoomId, channel: Channel },
    /// A stroke was committed to the room
    Inserted { stroke: Stroke },
    /// Every stroke of the room was deleted
    Cleared,
    /// Complete presence state of the room
    PresenceSync { cursors: Vec<Cursor> },
    /// Error message
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// A message from the server
    Message(ServerMessage),
    /// Error occurred
    Error { message: String },
}

#[cfg(feature = "remote")]
mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::sync::{Arc, Mutex};
    use std::task::Waker;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Wake whoever registered interest in the socket.
    fn wake(slot: &Mutex<Option<Waker>>) {
        let waker = slot.lock().ok().and_then(|mut waker| waker.take());
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// At most `max` characters of `text`, for logging.
    pub(crate) fn preview(text: &str, max: usize) -> &str {
        match text.char_indices().nth(max) {
            Some((end, _)) => &text[..end],
            None => text,
        }
    }

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation. A registered
    /// [`Waker`] is woken after every event and on every idle read timeout.
    pub struct NativeWebSocket {
        state: ConnectionState,
        events: Vec<SyncEvent>,
        waker: Arc<Mutex<Option<Waker>>>,
        /// Channel to send commands to the WebSocket thread.
        cmd_tx: Option<Sender<WsCommand>>,
        /// Channel to receive events from the WebSocket thread.
        event_rx: Option<Receiver<SyncEvent>>,
        /// Handle to the WebSocket thread.
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                waker: Arc::new(Mutex::new(None)),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a WebSocket server.
        ///
        /// Messages sent before the connection is up are queued and flushed once it is.
        pub fn connect(&mut self, url: &str) -> Result<(), String> {
            if self.cmd_tx.is_some() {
                return Err("Already connected".to_string());
            }

            let parsed_url = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(format!("Invalid WebSocket URL scheme: {}", parsed_url.scheme()));
            }

            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();

            let url = url.to_string();
            let waker = Arc::clone(&self.waker);

            let handle = thread::spawn(move || {
                log::info!("WebSocket thread: connecting to {}", url);

                match connect(&url) {
                    Ok((mut socket, response)) => {
                        log::info!("WebSocket connected, status: {}", response.status());
                        let _ = event_tx.send(SyncEvent::Connected);
                        wake(&waker);

                        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                            let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                        }

                        loop {
                            match cmd_rx.try_recv() {
                                Ok(WsCommand::Send(msg)) => {
                                    log::debug!("WebSocket sending: {}", preview(&msg, 100));
                                    if let Err(e) = socket.send(Message::Text(msg)) {
                                        log::error!("WebSocket send error: {}", e);
                                        break;
                                    }
                                    continue;
                                }
                                Ok(WsCommand::Close) => {
                                    log::info!("WebSocket close requested");
                                    let _ = socket.close(None);
                                    let _ = socket.flush();
                                    break;
                                }
                                Err(TryRecvError::Disconnected) => {
                                    log::info!("WebSocket command channel disconnected");
                                    break;
                                }
                                Err(TryRecvError::Empty) => {}
                            }

                            match socket.read() {
                                Ok(Message::Text(txt)) => {
                                    log::debug!("WebSocket received: {}", preview(&txt, 100));
                                    match serde_json::from_str::<ServerMessage>(&txt) {
                                        Ok(msg) => {
                                            let _ = event_tx.send(SyncEvent::Message(msg));
                                        }
                                        Err(e) => log::warn!("Failed to parse server message: {}", e),
                                    }
                                }
                                Ok(Message::Close(_)) => {
                                    log::info!("WebSocket received close frame");
                                    break;
                                }
                                // Pings are answered by tungstenite on the next read or write.
                                Ok(_) => {}
                                Err(tungstenite::Error::Io(ref e))
                                    if e.kind() == std::io::ErrorKind::WouldBlock
                                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                                Err(e) => {
                                    log::error!("WebSocket read error: {}", e);
                                    break;
                                }
                            }
                            wake(&waker);
                        }

                        log::info!("WebSocket thread exiting");
                        let _ = event_tx.send(SyncEvent::Disconnected);
                    }
                    Err(e) => {
                        log::error!("WebSocket connection failed: {}", e);
                        let _ = event_tx.send(SyncEvent::Error {
                            message: format!("Connection failed: {}", e),
                        });
                    }
                }
                wake(&waker);
            });

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);

            Ok(())
        }

        /// Disconnect from the server.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        /// Send a text message.
        pub fn send(&self, msg: &str) -> Result<(), String> {
            if let Some(ref tx) = self.cmd_tx {
                tx.send(WsCommand::Send(msg.to_string()))
                    .map_err(|e| format!("Send failed: {}", e))
            } else {
                Err("Not connected".to_string())
            }
        }

        /// Serialize and send a protocol message.
        pub fn send_message(&self, msg: &ClientMessage) -> Result<(), String> {
            let text = serde_json::to_string(msg).map_err(|e| format!("Serialize failed: {}", e))?;
            self.send(&text)
        }

        /// Poll for pending events (non-blocking).
        ///
        /// A socket thread that went away without saying so is reported as
        /// `Disconnected`, once.
        pub fn poll_events(&mut self) -> Vec<SyncEvent> {
            if let Some(ref rx) = self.event_rx {
                loop {
                    let event = match rx.try_recv() {
                        Ok(event) => event,
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            if matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
                                log::warn!("WebSocket thread ended unexpectedly");
                                self.state = ConnectionState::Disconnected;
                                self.events.push(SyncEvent::Disconnected);
                            }
                            break;
                        }
                    };
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                        SyncEvent::Message(_) => {}
                    }
                    self.events.push(event);
                }
            }

            std::mem::take(&mut self.events)
        }

        /// Wake `waker` on the next socket event or idle tick.
        pub fn register_waker(&self, waker: &Waker) {
            if let Ok(mut slot) = self.waker.lock() {
                *slot = Some(waker.clone());
            }
        }

        /// Get current connection state.
        pub fn state(&self) -> ConnectionState {
            self.state
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

}

#[cfg(feature = "remote")]
pub use native_client::NativeWebSocket;

#[cfg(feature = "remote")]
mod remote_hub {
    use super::*;
    use crate::error::{SyncError, SyncResult};
    use crate::feed::{ChangeFeed, FeedEvent, FeedSubscription};
    use crate::presence::{PresenceChannel, PresenceEvent, PresenceSnapshot, PresenceSubscription};
    use crate::storage::BoxFuture;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::task::{Context, Poll};
    use std::time::{Duration, Instant};
    use url::Url;

    /// Change feed and presence channel served by a relay server.
    ///
    /// Every subscription opens its own socket to `{base}/ws`. Subscribing
    /// never blocks: the join is acknowledged in the background, and
    /// [`FeedSubscription::ready`] resolves once the server confirmed it, so
    /// anything committed afterwards is guaranteed to be delivered.
    #[derive(Debug, Clone)]
    pub struct RemoteHub {
        ws_url: Url,
        join_timeout: Duration,
    }

    impl RemoteHub {
        /// Create a hub for a server such as `http://localhost:3030`.
        pub fn new(base_url: &str) -> Result<Self, String> {
            let mut url = Url::parse(base_url).map_err(|e| format!("Invalid URL: {}", e))?;
            let scheme = match url.scheme() {
                "http" | "ws" => "ws",
                "https" | "wss" => "wss",
                other => return Err(format!("Invalid server URL scheme: {}", other)),
            };
            url.set_scheme(scheme)
                .map_err(|_| format!("Cannot use scheme {} for {}", scheme, base_url))?;
            url.path_segments_mut()
                .map_err(|_| "Base URL cannot have a path".to_string())?
                .pop_if_empty()
                .push("ws");
            Ok(Self {
                ws_url: url,
                join_timeout: Duration::from_secs(5),
            })
        }

        /// How long to wait for the join acknowledgement before giving up on the link.
        pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
            self.join_timeout = timeout;
            self
        }

        /// The socket endpoint.
        pub fn ws_url(&self) -> &Url {
            &self.ws_url
        }

        /// Connect and send the join. The acknowledgement is awaited by the link.
        fn open(&self, room: &RoomId, channel: Channel, identity: Option<&Identity>) -> SyncResult<SharedLink> {
            let fail = |reason: String| SyncError::disconnect(room, channel, reason);

            let mut socket = NativeWebSocket::new();
            socket.connect(self.ws_url.as_str()).map_err(fail)?;
            socket
                .send_message(&ClientMessage::Join {
                    room: room.clone(),
                    channel,
                    identity: identity.cloned(),
                })
                .map_err(fail)?;

            Ok(Arc::new(Mutex::new(Link {
                room: room.clone(),
                channel,
                socket,
                phase: Phase::Joining {
                    deadline: Instant::now() + self.join_timeout,
                },
                inbox: Vec::new(),
                lost: None,
            })))
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Phase {
        Joining { deadline: Instant },
        Joined,
        Closed,
    }

    /// One socket joined to one channel, shared by a subscription and its join gate.
    struct Link {
        room: RoomId,
        channel: Channel,
        socket: NativeWebSocket,
        phase: Phase,
        /// Messages received after the join, not yet handed out.
        inbox: Vec<ServerMessage>,
        /// Why the link closed, until reported.
        lost: Option<String>,
    }

    type SharedLink = Arc<Mutex<Link>>;

    fn lock(link: &SharedLink) -> MutexGuard<'_, Link> {
        link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    impl Link {
        /// Move socket events into the link.
        fn drain(&mut self) {
            for event in self.socket.poll_events() {
                match event {
                    SyncEvent::Message(ServerMessage::Joined { .. }) if matches!(self.phase, Phase::Joining { .. }) => {
                        log::info!("Joined {} channel of room {}", self.channel, self.room);
                        self.phase = Phase::Joined;
                    }
                    SyncEvent::Message(ServerMessage::Error { message }) if matches!(self.phase, Phase::Joining { .. }) => {
                        self.close(message);
                    }
                    SyncEvent::Message(msg) if self.phase == Phase::Joined => self.inbox.push(msg),
                    SyncEvent::Message(msg) => log::debug!("Dropping {:?} outside the join", msg),
                    SyncEvent::Disconnected => self.close("connection closed".to_string()),
                    SyncEvent::Error { message } => self.close(message),
                    SyncEvent::Connected => {}
                }
            }
            if let Phase::Joining { deadline } = self.phase {
                if Instant::now() >= deadline {
                    self.close("timed out waiting for join".to_string());
                }
            }
        }

        fn close(&mut self, reason: String) {
            if self.phase != Phase::Closed {
                log::warn!("{} channel of room {} lost: {}", self.channel, self.room, reason);
                self.phase = Phase::Closed;
                self.lost = Some(reason);
            }
        }

        fn is_joining(&self) -> bool {
            matches!(self.phase, Phase::Joining { .. })
        }
    }

    /// Resolves when the link's join was acknowledged or the link failed.
    struct JoinGate {
        link: SharedLink,
        timer_armed: bool,
    }

    impl Future for JoinGate {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            let deadline = {
                let mut link = lock(&self.link);
                link.drain();
                let Phase::Joining { deadline } = link.phase else {
                    return Poll::Ready(());
                };
                link.socket.register_waker(cx.waker());
                // An event may have landed before the waker was in place.
                link.drain();
                if !link.is_joining() {
                    return Poll::Ready(());
                }
                deadline
            };
            // A stalled handshake produces no socket events, so the deadline needs its own wake-up.
            if !self.timer_armed {
                self.timer_armed = true;
                let waker = cx.waker().clone();
                std::thread::spawn(move || {
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    waker.wake();
                });
            }
            Poll::Pending
        }
    }

    impl ChangeFeed for RemoteHub {
        fn subscribe(&self, room: &RoomId) -> SyncResult<Box<dyn FeedSubscription>> {
            let link = self.open(room, Channel::Strokes, None)?;
            Ok(Box::new(RemoteFeedSubscription { link }))
        }
    }

    impl PresenceChannel for RemoteHub {
        fn join(&self, room: &RoomId, identity: &Identity) -> SyncResult<Box<dyn PresenceSubscription>> {
            let link = self.open(room, Channel::Cursors, Some(identity))?;
            Ok(Box::new(RemotePresenceSubscription { link }))
        }
    }

    struct RemoteFeedSubscription {
        link: SharedLink,
    }

    impl FeedSubscription for RemoteFeedSubscription {
        fn poll_events(&mut self) -> Vec<FeedEvent> {
            let mut link = lock(&self.link);
            link.drain();
            let mut events = Vec::new();
            for msg in std::mem::take(&mut link.inbox) {
                match msg {
                    ServerMessage::Inserted { stroke } => events.push(FeedEvent::Insert(stroke)),
                    ServerMessage::Cleared => events.push(FeedEvent::Clear),
                    ServerMessage::Error { message } => log::warn!("Strokes channel error: {}", message),
                    other => log::debug!("Ignoring {:?} on strokes channel", other),
                }
            }
            if let Some(reason) = link.lost.take() {
                events.push(FeedEvent::Disconnected { reason });
            }
            events
        }

        fn ready(&self) -> BoxFuture<'static, ()> {
            Box::pin(JoinGate {
                link: Arc::clone(&self.link),
                timer_armed: false,
            })
        }
    }

    impl Drop for RemoteFeedSubscription {
        fn drop(&mut self) {
            let _ = lock(&self.link).socket.send_message(&ClientMessage::Leave);
        }
    }

    struct RemotePresenceSubscription {
        link: SharedLink,
    }

    impl PresenceSubscription for RemotePresenceSubscription {
        fn publish(&mut self, cursor: Cursor) -> SyncResult<()> {
            let link = lock(&self.link);
            if link.phase == Phase::Closed {
                return Err(SyncError::disconnect(&link.room, Channel::Cursors, "connection closed"));
            }
            // Queued behind the join while it is in flight.
            link.socket
                .send_message(&ClientMessage::Cursor { cursor })
                .map_err(|e| SyncError::disconnect(&link.room, Channel::Cursors, e))
        }

        fn poll_events(&mut self) -> Vec<PresenceEvent> {
            let mut link = lock(&self.link);
            link.drain();
            let mut events = Vec::new();
            for msg in std::mem::take(&mut link.inbox) {
                match msg {
                    ServerMessage::PresenceSync { cursors } => {
                        events.push(PresenceEvent::Sync(PresenceSnapshot::from_cursors(cursors)))
                    }
                    ServerMessage::Error { message } => log::warn!("Cursors channel error: {}", message),
                    other => log::debug!("Ignoring {:?} on cursors channel", other),
                }
            }
            if let Some(reason) = link.lost.take() {
                events.push(PresenceEvent::Disconnected { reason });
            }
            events
        }
    }

    impl Drop for RemotePresenceSubscription {
        fn drop(&mut self) {
            let _ = lock(&self.link).socket.send_message(&ClientMessage::Leave);
        }
    }

}

#[cfg(feature = "remote")]
pub use remote_hub::RemoteHub;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorId, Brush, CommitOrder, NewStroke};
    use kurbo::Point;

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join {
            room: RoomId::from("main-room"),
            channel: Channel::Strokes,
            identity: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"join","room":"main-room","channel":"strokes"}"#);
    }

    #[test]
    fn test_presence_join_carries_identity() {
        let json = r##"{"type":"join","room":"r","channel":"cursors","identity":{"author_id":"user-abc","display_name":"Ann","color":"#22c55e"}}"##;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join { channel, identity, .. } => {
                assert_eq!(channel, Channel::Cursors);
                assert_eq!(identity.unwrap().display_name, "Ann");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_server_message_deserialize() {
        let json = r#"{"type":"joined","room":"test","channel":"cursors"}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Joined {
                room: RoomId::from("test"),
                channel: Channel::Cursors
            }
        );

        let msg: ServerMessage = serde_json::from_str(r#"{"type":"cleared"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Cleared);
    }

    #[test]
    fn test_inserted_carries_flat_stroke() {
        let stroke = NewStroke::new(
            AuthorId::from("a"),
            vec![Point::new(1.0, 2.0)],
            Brush::eraser(16.0),
        )
        .commit(CommitOrder(7));
        let json = serde_json::to_value(ServerMessage::Inserted { stroke }).unwrap();
        assert_eq!(json["type"], "inserted");
        assert_eq!(json["stroke"]["tool"], "eraser");
        assert_eq!(json["stroke"]["commit_order"], 7);
    }
}
