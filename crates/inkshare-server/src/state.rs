//! Shared server state: the stroke log and per-room broadcast channels.

use dashmap::DashMap;
use inkshare_core::{AuthorId, Cursor, Identity, PresenceSnapshot, RoomId, ServerMessage, StrokeLog};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};

/// Room state
struct Room {
    /// Change feed of the room's stroke log
    strokes_tx: broadcast::Sender<ServerMessage>,
    /// Presence snapshots
    presence_tx: broadcast::Sender<ServerMessage>,
    /// Current cursor of everyone present
    cursors: PresenceSnapshot,
    /// Open presence connections per author
    members: HashMap<AuthorId, usize>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (strokes_tx, _) = broadcast::channel(capacity);
        let (presence_tx, _) = broadcast::channel(capacity);
        Self {
            strokes_tx,
            presence_tx,
            cursors: PresenceSnapshot::new(),
            members: HashMap::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.strokes_tx.receiver_count() == 0 && self.members.is_empty()
    }

    fn broadcast_presence(&self) {
        let _ = self.presence_tx.send(ServerMessage::PresenceSync {
            cursors: self.cursors.to_vec(),
        });
    }
}

/// Shared application state
pub struct AppState {
    /// Durable stroke log
    log: Arc<dyn StrokeLog>,
    /// Active rooms
    rooms: DashMap<RoomId, Room>,
    /// Serializes log mutations and their broadcast per room, so the feed
    /// carries them in commit order and a clear is never overtaken.
    writers: DashMap<RoomId, Arc<Mutex<()>>>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(log: Arc<dyn StrokeLog>, channel_capacity: usize) -> Self {
        Self {
            log,
            rooms: DashMap::new(),
            writers: DashMap::new(),
            channel_capacity,
        }
    }

    pub fn log(&self) -> &dyn StrokeLog {
        self.log.as_ref()
    }

    /// Take the write lock of a room.
    pub async fn lock_room(&self, room: &RoomId) -> OwnedMutexGuard<()> {
        let writer = self.writers.entry(room.clone()).or_default().clone();
        writer.lock_owned().await
    }

    /// Forget the write lock of a room if nobody holds or waits for it.
    pub fn release_room_lock(&self, room: &RoomId) {
        self.writers.remove_if(room, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Subscribe to the room's change feed.
    pub fn subscribe_strokes(&self, room: &RoomId) -> broadcast::Receiver<ServerMessage> {
        self.rooms
            .entry(room.clone())
            .or_insert_with(|| Room::new(self.channel_capacity))
            .strokes_tx
            .subscribe()
    }

    /// Notify the room's feed subscribers.
    pub fn broadcast_stroke(&self, room: &RoomId, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room) {
            let _ = room.strokes_tx.send(msg);
        }
    }

    /// Join the room's presence as `identity`, announced at `(0, 0)`.
    ///
    /// The returned receiver already holds the snapshot including the joiner.
    pub fn join_presence(&self, room: &RoomId, identity: &Identity) -> broadcast::Receiver<ServerMessage> {
        let mut room = self
            .rooms
            .entry(room.clone())
            .or_insert_with(|| Room::new(self.channel_capacity));
        let rx = room.presence_tx.subscribe();
        *room.members.entry(identity.author_id.clone()).or_default() += 1;
        if room.cursors.get(&identity.author_id).is_none() {
            room.cursors.upsert(Cursor::at(identity, 0.0, 0.0));
        }
        room.broadcast_presence();
        rx
    }

    /// Replace an author's cursor and broadcast the snapshot.
    pub fn update_cursor(&self, room: &RoomId, cursor: Cursor) {
        if let Some(mut room) = self.rooms.get_mut(room) {
            if !room.members.contains_key(&cursor.author_id) {
                return;
            }
            room.cursors.upsert(cursor);
            room.broadcast_presence();
        }
    }

    /// Drop one presence connection of `author`. The cursor goes away with the last one.
    pub fn leave_presence(&self, room_id: &RoomId, author: &AuthorId) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            if let Some(count) = room.members.get_mut(author) {
                *count -= 1;
                if *count == 0 {
                    room.members.remove(author);
                    room.cursors.remove(author);
                    room.broadcast_presence();
                }
            }
        }
        self.remove_if_idle(room_id);
    }

    /// Forget the room once nobody listens anymore.
    pub fn remove_if_idle(&self, room_id: &RoomId) {
        if self.rooms.remove_if(room_id, |_, room| room.is_idle()).is_some() {
            tracing::debug!("Room {} is idle, dropped", room_id);
        }
    }

    /// Number of rooms with live subscribers.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Current presence of a room.
    pub fn presence(&self, room: &RoomId) -> PresenceSnapshot {
        self.rooms
            .get(room)
            .map(|room| room.cursors.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkshare_core::MemoryStrokeLog;

    fn state() -> AppState {
        AppState::new(Arc::new(MemoryStrokeLog::new()), 16)
    }

    fn snapshot(msg: ServerMessage) -> Vec<Cursor> {
        match msg {
            ServerMessage::PresenceSync { cursors } => cursors,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_presence_lifecycle() {
        let state = state();
        let room = RoomId::from("r");
        let ann = Identity::new("ann", "Ann", "#06b6d4");
        let bob = Identity::new("bob", "Bob", "#f43f5e");

        let mut ann_rx = state.join_presence(&room, &ann);
        assert_eq!(snapshot(ann_rx.try_recv().unwrap()).len(), 1);

        let _bob_rx = state.join_presence(&room, &bob);
        let cursors = snapshot(ann_rx.try_recv().unwrap());
        assert_eq!(cursors.len(), 2);

        state.update_cursor(&room, Cursor::at(&bob, 10.0, 20.0));
        let cursors = snapshot(ann_rx.try_recv().unwrap());
        assert!(cursors.iter().any(|c| c.author_id == bob.author_id && c.x == 10.0));

        state.leave_presence(&room, &bob.author_id);
        let cursors = snapshot(ann_rx.try_recv().unwrap());
        assert_eq!(cursors.len(), 1);
    }

    #[test]
    fn test_second_connection_keeps_cursor() {
        let state = state();
        let room = RoomId::from("r");
        let ann = Identity::new("ann", "Ann", "#06b6d4");

        let _a = state.join_presence(&room, &ann);
        let _b = state.join_presence(&room, &ann);
        state.leave_presence(&room, &ann.author_id);
        assert_eq!(state.presence(&room).len(), 1);
        state.leave_presence(&room, &ann.author_id);
        assert!(state.presence(&room).is_empty());
    }

    #[test]
    fn test_cursor_from_non_member_is_ignored() {
        let state = state();
        let room = RoomId::from("r");
        let _rx = state.join_presence(&room, &Identity::new("ann", "Ann", "#fff"));
        state.update_cursor(&room, Cursor::at(&Identity::new("eve", "Eve", "#000"), 1.0, 1.0));
        assert_eq!(state.presence(&room).len(), 1);
    }

    #[test]
    fn test_idle_room_is_dropped() {
        let state = state();
        let room = RoomId::from("r");
        let rx = state.subscribe_strokes(&room);
        assert_eq!(state.room_count(), 1);
        drop(rx);
        state.remove_if_idle(&room);
        assert_eq!(state.room_count(), 0);
    }

    #[tokio::test]
    async fn test_room_lock_is_released() {
        let state = state();
        let room = RoomId::from("r");
        let guard = state.lock_room(&room).await;
        state.release_room_lock(&room);
        assert_eq!(state.writers.len(), 1);
        drop(guard);
        state.release_room_lock(&room);
        assert!(state.writers.is_empty());
    }
}
