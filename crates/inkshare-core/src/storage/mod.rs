//! Durable, append-only stroke log.

mod file;
mod memory;

#[cfg(feature = "remote")]
mod http;

pub use file::{FileStrokeLog, LogRecord};
pub use memory::MemoryStrokeLog;

#[cfg(feature = "remote")]
pub use http::HttpStrokeLog;

use crate::model::{NewStroke, RoomId, Stroke};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Room not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Rejected by the log: {0}")]
    Rejected(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for log operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-room ordered log of committed strokes.
///
/// Strokes are never edited in place. The only mutation of committed strokes
/// is [`StrokeLog::clear_room`], which removes all of them.
pub trait StrokeLog: Send + Sync {
    /// All strokes of the room, ascending by commit order.
    fn load_all(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>>;

    /// Persist a stroke and return it with its assigned commit order.
    ///
    /// The order is greater than that of every stroke previously committed to
    /// the room, including strokes removed by a clear. Appending an id that is
    /// already stored returns the stored stroke unchanged.
    fn append(&self, room: &RoomId, stroke: NewStroke) -> BoxFuture<'_, StorageResult<Stroke>>;

    /// Delete every stroke of the room.
    fn clear_room(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<()>>;
}

impl<L: StrokeLog + ?Sized> StrokeLog for std::sync::Arc<L> {
    fn load_all(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        (**self).load_all(room)
    }

    fn append(&self, room: &RoomId, stroke: NewStroke) -> BoxFuture<'_, StorageResult<Stroke>> {
        (**self).append(room, stroke)
    }

    fn clear_room(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<()>> {
        (**self).clear_room(room)
    }
}

/// Polling executor for tests. It spins rather than parking on the waker.
#[cfg(test)]
pub(crate) fn block_on<F: Future>(f: F) -> F::Output {
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut f = std::pin::pin!(f);

    loop {
        if let Poll::Ready(result) = f.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
