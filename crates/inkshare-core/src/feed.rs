//! Change feed of the stroke log.

use crate::error::SyncResult;
use crate::model::{RoomId, Stroke};
use crate::storage::BoxFuture;

/// Notification about a mutation of a room's stroke log.
///
/// Inserts are delivered at least once and best-effort in commit order.
/// `Clear` always means the whole room was cleared.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Insert(Stroke),
    Clear,
    /// The link dropped. Strokes committed from now on are missed until reload.
    Disconnected { reason: String },
}

/// Source of per-room change feeds.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, room: &RoomId) -> SyncResult<Box<dyn FeedSubscription>>;
}

/// Live subscription to one room. Dropping it unsubscribes.
pub trait FeedSubscription: Send {
    /// Drain events received since the last poll, in arrival order.
    fn poll_events(&mut self) -> Vec<FeedEvent>;

    /// Resolves once every stroke committed from then on will be delivered,
    /// or once the subscription has failed. History loads wait for it.
    fn ready(&self) -> BoxFuture<'static, ()> {
        Box::pin(std::future::ready(()))
    }
}
