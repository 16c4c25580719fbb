//! Ephemeral cursor presence.
//!
//! Every sync carries the complete `author -> cursor` map of the room. The
//! rendered cursor set is rebuilt from scratch on each sync rather than merged,
//! so a stale partial update can never survive.

use crate::error::SyncResult;
use crate::model::{AuthorId, Identity, RoomId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Latest pointer state of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub author_id: AuthorId,
    pub display_name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
    /// When the position was published, in Unix milliseconds.
    pub updated_at: u64,
}

impl Cursor {
    /// Cursor of `identity` at the given canvas position, stamped now.
    pub fn at(identity: &Identity, x: f64, y: f64) -> Self {
        Self {
            author_id: identity.author_id.clone(),
            display_name: identity.display_name.clone(),
            color: identity.color.clone(),
            x,
            y,
            updated_at: now_millis(),
        }
    }
}

/// Full presence state of a room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceSnapshot {
    cursors: BTreeMap<AuthorId, Cursor>,
}

impl PresenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list of cursors. A later entry for the same author wins.
    pub fn from_cursors(cursors: impl IntoIterator<Item = Cursor>) -> Self {
        Self {
            cursors: cursors
                .into_iter()
                .map(|cursor| (cursor.author_id.clone(), cursor))
                .collect(),
        }
    }

    /// Replace the author's cursor.
    pub fn upsert(&mut self, cursor: Cursor) {
        self.cursors.insert(cursor.author_id.clone(), cursor);
    }

    pub fn remove(&mut self, author_id: &AuthorId) -> Option<Cursor> {
        self.cursors.remove(author_id)
    }

    pub fn get(&self, author_id: &AuthorId) -> Option<&Cursor> {
        self.cursors.get(author_id)
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Cursors ordered by author id.
    pub fn iter(&self) -> impl Iterator<Item = &Cursor> {
        self.cursors.values()
    }

    pub fn to_vec(&self) -> Vec<Cursor> {
        self.cursors.values().cloned().collect()
    }

    /// Everyone present, including the local participant.
    pub fn participants(&self, local: &AuthorId) -> Vec<Participant> {
        self.cursors
            .values()
            .map(|cursor| Participant {
                author_id: cursor.author_id.clone(),
                display_name: cursor.display_name.clone(),
                color: cursor.color.clone(),
                is_local: &cursor.author_id == local,
            })
            .collect()
    }
}

/// Entry of the user list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub author_id: AuthorId,
    pub display_name: String,
    pub color: String,
    pub is_local: bool,
}

/// Cursors of everyone except the local participant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteCursors {
    cursors: Vec<Cursor>,
}

impl RemoteCursors {
    /// Derive the rendered set from a full snapshot.
    pub fn from_snapshot(snapshot: &PresenceSnapshot, local: &AuthorId) -> Self {
        Self {
            cursors: snapshot
                .iter()
                .filter(|cursor| &cursor.author_id != local)
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cursor> {
        self.cursors.iter()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }
}

/// Event delivered by a presence subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// Complete current state of the room.
    Sync(PresenceSnapshot),
    /// The link dropped. No further events will arrive.
    Disconnected { reason: String },
}

/// Per-room presence broadcast.
pub trait PresenceChannel: Send + Sync {
    /// Join the room's presence channel as `identity`.
    ///
    /// The participant is announced at `(0, 0)` until the first publish.
    fn join(&self, room: &RoomId, identity: &Identity) -> SyncResult<Box<dyn PresenceSubscription>>;
}

/// Live membership in a room's presence channel. Dropping it leaves the room.
pub trait PresenceSubscription: Send {
    /// Broadcast the local cursor. A lost publish is not retried.
    fn publish(&mut self, cursor: Cursor) -> SyncResult<()>;

    /// Drain events received since the last poll.
    fn poll_events(&mut self) -> Vec<PresenceEvent>;
}
