//! In-process change feed and presence broadcast.
//!
//! `LocalHub` plays the part of the relay server inside one process: strokes
//! appended through it are persisted in the wrapped log and then fanned out to
//! every feed subscriber of the room, and every cursor publish fans out the
//! room's full presence snapshot.

use crate::error::{Channel, SyncError, SyncResult};
use crate::feed::{ChangeFeed, FeedEvent, FeedSubscription};
use crate::model::{AuthorId, Identity, NewStroke, RoomId, Stroke};
use crate::presence::{Cursor, PresenceChannel, PresenceEvent, PresenceSnapshot, PresenceSubscription};
use crate::storage::{BoxFuture, StorageResult, StrokeLog};
use futures_util::lock::Mutex as WriteLock;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct HubRoom {
    feeds: HashMap<u64, Sender<FeedEvent>>,
    presence: HashMap<u64, (AuthorId, Sender<PresenceEvent>)>,
    cursors: PresenceSnapshot,
}

impl HubRoom {
    fn is_idle(&self) -> bool {
        self.feeds.is_empty() && self.presence.is_empty()
    }

    fn broadcast_feed(&mut self, event: &FeedEvent) {
        // Receivers that hung up are pruned on the way.
        self.feeds.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    fn broadcast_presence(&mut self) {
        let snapshot = self.cursors.clone();
        self.presence
            .retain(|_, (_, tx)| tx.send(PresenceEvent::Sync(snapshot.clone())).is_ok());
    }
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<RoomId, HubRoom>,
    /// Held across a log mutation and its broadcast, so subscribers see
    /// inserts and clears in the order the log applied them.
    writers: HashMap<RoomId, Arc<WriteLock<()>>>,
    next_subscriber: u64,
    /// Deliver every insert twice, like an at-least-once transport.
    redeliver: bool,
}

impl HubState {
    fn next_id(&mut self) -> u64 {
        self.next_subscriber += 1;
        self.next_subscriber
    }
}

/// In-process stroke log, change feed and presence channel.
#[derive(Clone)]
pub struct LocalHub {
    log: Arc<dyn StrokeLog>,
    state: Arc<Mutex<HubState>>,
}

impl LocalHub {
    /// Wrap a stroke log.
    pub fn new(log: Arc<dyn StrokeLog>) -> Self {
        Self {
            log,
            state: Arc::new(Mutex::new(HubState::default())),
        }
    }

    /// Deliver each insert twice from now on.
    pub fn set_redelivery(&self, redeliver: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.redeliver = redeliver;
        }
    }

    /// Drop every live link of a room, as if the network went away.
    ///
    /// Subscribers receive a final `Disconnected` event and cursors of the room are forgotten.
    pub fn disconnect_room(&self, room: &RoomId) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(hub_room) = state.rooms.remove(room) {
            for tx in hub_room.feeds.values() {
                let _ = tx.send(FeedEvent::Disconnected {
                    reason: "link dropped".to_string(),
                });
            }
            for (_, tx) in hub_room.presence.values() {
                let _ = tx.send(PresenceEvent::Disconnected {
                    reason: "link dropped".to_string(),
                });
            }
            log::info!("Disconnected all subscribers of room {}", room);
        }
    }

    /// Number of live feed and presence subscriptions in a room.
    pub fn subscriber_count(&self, room: &RoomId) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.rooms.get(room).map(|r| r.feeds.len() + r.presence.len()))
            .unwrap_or(0)
    }

    fn writer(&self, room: &RoomId) -> Option<Arc<WriteLock<()>>> {
        let mut state = self.state.lock().ok()?;
        Some(Arc::clone(
            state
                .writers
                .entry(room.clone())
                .or_insert_with(|| Arc::new(WriteLock::new(()))),
        ))
    }

    /// Forget the room's write lock if nobody else holds or waits for it.
    fn release_writer(&self, room: &RoomId, writer: Option<Arc<WriteLock<()>>>) {
        drop(writer);
        if let Ok(mut state) = self.state.lock() {
            if state.writers.get(room).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                state.writers.remove(room);
            }
        }
    }

    fn broadcast_feed(&self, room: &RoomId, event: FeedEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let copies = if state.redeliver && matches!(event, FeedEvent::Insert(_)) { 2 } else { 1 };
        if let Some(hub_room) = state.rooms.get_mut(room) {
            for _ in 0..copies {
                hub_room.broadcast_feed(&event);
            }
        }
    }
}

impl StrokeLog for LocalHub {
    fn load_all(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        self.log.load_all(room)
    }

    fn append(&self, room: &RoomId, stroke: NewStroke) -> BoxFuture<'_, StorageResult<Stroke>> {
        let room = room.clone();
        Box::pin(async move {
            let writer = self.writer(&room);
            let result = match &writer {
                Some(writer) => {
                    let _guard = writer.lock().await;
                    let result = self.log.append(&room, stroke).await;
                    if let Ok(committed) = &result {
                        self.broadcast_feed(&room, FeedEvent::Insert(committed.clone()));
                    }
                    result
                }
                None => self.log.append(&room, stroke).await,
            };
            self.release_writer(&room, writer);
            result
        })
    }

    fn clear_room(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<()>> {
        let room = room.clone();
        Box::pin(async move {
            let writer = self.writer(&room);
            let result = match &writer {
                Some(writer) => {
                    let _guard = writer.lock().await;
                    let result = self.log.clear_room(&room).await;
                    if result.is_ok() {
                        self.broadcast_feed(&room, FeedEvent::Clear);
                    }
                    result
                }
                None => self.log.clear_room(&room).await,
            };
            self.release_writer(&room, writer);
            result
        })
    }
}

impl ChangeFeed for LocalHub {
    fn subscribe(&self, room: &RoomId) -> SyncResult<Box<dyn FeedSubscription>> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| SyncError::disconnect(room, Channel::Strokes, e.to_string()))?;
        let id = state.next_id();
        let (tx, rx) = channel();
        state.rooms.entry(room.clone()).or_default().feeds.insert(id, tx);
        log::debug!("Feed subscriber {} joined room {}", id, room);

        Ok(Box::new(LocalFeedSubscription {
            id,
            room: room.clone(),
            state: Arc::clone(&self.state),
            rx,
        }))
    }
}

impl PresenceChannel for LocalHub {
    fn join(&self, room: &RoomId, identity: &Identity) -> SyncResult<Box<dyn PresenceSubscription>> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| SyncError::disconnect(room, Channel::Cursors, e.to_string()))?;
        let id = state.next_id();
        let (tx, rx) = channel();
        let hub_room = state.rooms.entry(room.clone()).or_default();
        hub_room.presence.insert(id, (identity.author_id.clone(), tx));
        hub_room.cursors.upsert(Cursor::at(identity, 0.0, 0.0));
        hub_room.broadcast_presence();
        log::debug!("{} joined presence of room {}", identity.author_id, room);

        Ok(Box::new(LocalPresenceSubscription {
            id,
            room: room.clone(),
            author_id: identity.author_id.clone(),
            state: Arc::clone(&self.state),
            rx,
        }))
    }
}

struct LocalFeedSubscription {
    id: u64,
    room: RoomId,
    state: Arc<Mutex<HubState>>,
    rx: Receiver<FeedEvent>,
}

impl FeedSubscription for LocalFeedSubscription {
    fn poll_events(&mut self) -> Vec<FeedEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for LocalFeedSubscription {
    fn drop(&mut self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(hub_room) = state.rooms.get_mut(&self.room) {
            hub_room.feeds.remove(&self.id);
            if hub_room.is_idle() {
                state.rooms.remove(&self.room);
            }
        }
    }
}

struct LocalPresenceSubscription {
    id: u64,
    room: RoomId,
    author_id: AuthorId,
    state: Arc<Mutex<HubState>>,
    rx: Receiver<PresenceEvent>,
}

impl PresenceSubscription for LocalPresenceSubscription {
    fn publish(&mut self, cursor: Cursor) -> SyncResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| SyncError::disconnect(&self.room, Channel::Cursors, e.to_string()))?;
        let Some(hub_room) = state.rooms.get_mut(&self.room) else {
            return Err(SyncError::disconnect(&self.room, Channel::Cursors, "not joined"));
        };
        if !hub_room.presence.contains_key(&self.id) {
            return Err(SyncError::disconnect(&self.room, Channel::Cursors, "not joined"));
        }
        hub_room.cursors.upsert(cursor);
        hub_room.broadcast_presence();
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<PresenceEvent> {
        self.rx.try_iter().collect()
    }
}

impl Drop for LocalPresenceSubscription {
    fn drop(&mut self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let Some(hub_room) = state.rooms.get_mut(&self.room) else {
            return;
        };
        if hub_room.presence.remove(&self.id).is_none() {
            return;
        }
        let still_present = hub_room.presence.values().any(|(author, _)| author == &self.author_id);
        if !still_present {
            hub_room.cursors.remove(&self.author_id);
            hub_room.broadcast_presence();
        }
        if hub_room.is_idle() {
            state.rooms.remove(&self.room);
        }
    }
}
