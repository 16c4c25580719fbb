//! InkShare Core Library
//!
//! Stroke model, committed history, presence and the room session engine of
//! the InkShare shared whiteboard. Rendering lives in `inkshare-render`, the
//! relay in `inkshare-server`.

pub mod error;
pub mod feed;
pub mod history;
pub mod hub;
pub mod input;
pub mod model;
pub mod presence;
pub mod room;
pub mod session;
pub mod storage;
pub mod sync;

pub use error::{Channel, SyncError, SyncResult};
pub use feed::{ChangeFeed, FeedEvent, FeedSubscription};
pub use history::{CommittedHistory, FoldOutcome};
pub use hub::LocalHub;
pub use input::{CanvasMapping, PointerEvent};
pub use model::{
    AuthorId, Brush, CommitOrder, CompositeMode, Identity, NewStroke, Rgba, RoomId, Stroke, StrokeColor, StrokeId,
    StrokeView, ToolKind,
};
pub use presence::{Cursor, Participant, PresenceChannel, PresenceEvent, PresenceSnapshot, PresenceSubscription, RemoteCursors};
pub use room::{FrameInput, RoomSession};
pub use session::LocalDrawSession;
pub use storage::{FileStrokeLog, MemoryStrokeLog, StorageError, StorageResult, StrokeLog};
pub use sync::{ClientMessage, ConnectionState, ServerMessage, SyncEvent};

#[cfg(feature = "remote")]
pub use storage::HttpStrokeLog;
#[cfg(feature = "remote")]
pub use sync::{NativeWebSocket, RemoteHub};

pub use kurbo::{Point, Rect, Size};
