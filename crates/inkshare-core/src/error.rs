//! Recoverable synchronization errors surfaced to the UI layer.

use crate::model::{RoomId, StrokeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The two live channels of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Change feed of the stroke log.
    Strokes,
    /// Ephemeral cursor presence.
    Cursors,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Strokes => f.write_str("strokes"),
            Channel::Cursors => f.write_str("cursors"),
        }
    }
}

/// Synchronization errors. None of them is fatal; retrying is up to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Initial history fetch failed; the room was entered with an empty history.
    #[error("Failed to load history of room {room}: {reason}")]
    LoadFailure { room: RoomId, reason: String },
    /// Appending a stroke failed; it is not part of the durable log.
    #[error("Failed to commit stroke {stroke_id}: {reason}")]
    CommitFailure { stroke_id: StrokeId, reason: String },
    /// Clearing the room failed; local history was left untouched.
    #[error("Failed to clear room {room}: {reason}")]
    ClearFailure { room: RoomId, reason: String },
    /// A live channel dropped or could not be opened. Reconnect and reload to resync.
    #[error("The {channel} channel of room {room} disconnected: {reason}")]
    ChannelDisconnect {
        room: RoomId,
        channel: Channel,
        reason: String,
    },
}

impl SyncError {
    pub fn disconnect(room: &RoomId, channel: Channel, reason: impl Into<String>) -> Self {
        SyncError::ChannelDisconnect {
            room: room.clone(),
            channel,
            reason: reason.into(),
        }
    }

    /// Whether the history may be missing strokes until the next full load.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            SyncError::LoadFailure { .. }
                | SyncError::ChannelDisconnect {
                    channel: Channel::Strokes,
                    ..
                }
        )
    }
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
