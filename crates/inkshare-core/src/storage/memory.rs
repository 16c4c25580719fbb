//! In-memory stroke log.

use super::{BoxFuture, StorageError, StorageResult, StrokeLog};
use crate::model::{CommitOrder, NewStroke, RoomId, Stroke};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct RoomLog {
    /// Committed strokes, ascending by commit order.
    strokes: Vec<Stroke>,
    /// Highest commit order ever handed out, kept across clears.
    high_water: CommitOrder,
}

/// In-memory stroke log for tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryStrokeLog {
    rooms: RwLock<HashMap<RoomId, RoomLog>>,
}

impl MemoryStrokeLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl StrokeLog for MemoryStrokeLog {
    fn load_all(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        let room = room.clone();
        Box::pin(async move {
            let rooms = self.rooms.read().map_err(lock_error)?;
            Ok(rooms.get(&room).map(|log| log.strokes.clone()).unwrap_or_default())
        })
    }

    fn append(&self, room: &RoomId, stroke: NewStroke) -> BoxFuture<'_, StorageResult<Stroke>> {
        let room = room.clone();
        Box::pin(async move {
            stroke.validate().map_err(StorageError::Rejected)?;

            let mut rooms = self.rooms.write().map_err(lock_error)?;
            let log = rooms.entry(room).or_default();
            if let Some(existing) = log.strokes.iter().find(|s| s.id == stroke.id) {
                return Ok(existing.clone());
            }

            log.high_water = log.high_water.next();
            let committed = stroke.commit(log.high_water);
            log.strokes.push(committed.clone());
            Ok(committed)
        })
    }

    fn clear_room(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<()>> {
        let room = room.clone();
        Box::pin(async move {
            let mut rooms = self.rooms.write().map_err(lock_error)?;
            if let Some(log) = rooms.get_mut(&room) {
                log.strokes.clear();
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorId, Brush};
    use crate::storage::block_on;
    use kurbo::Point;

    fn new_stroke() -> NewStroke {
        NewStroke::new(
            AuthorId::from("author"),
            vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
            Brush::default(),
        )
    }

    #[test]
    fn test_append_and_load_in_commit_order() {
        let log = MemoryStrokeLog::new();
        let room = RoomId::from("main-room");

        let first = block_on(log.append(&room, new_stroke())).unwrap();
        let second = block_on(log.append(&room, new_stroke())).unwrap();
        assert!(second.commit_order > first.commit_order);

        let loaded = block_on(log.load_all(&room)).unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn test_rooms_are_isolated() {
        let log = MemoryStrokeLog::new();
        block_on(log.append(&RoomId::from("a"), new_stroke())).unwrap();
        assert!(block_on(log.load_all(&RoomId::from("b"))).unwrap().is_empty());
    }

    #[test]
    fn test_append_same_id_is_idempotent() {
        let log = MemoryStrokeLog::new();
        let room = RoomId::from("r");
        let stroke = new_stroke();

        let first = block_on(log.append(&room, stroke.clone())).unwrap();
        let again = block_on(log.append(&room, stroke)).unwrap();
        assert_eq!(first, again);
        assert_eq!(block_on(log.load_all(&room)).unwrap().len(), 1);
    }

    #[test]
    fn test_clear_keeps_commit_order_monotonic() {
        let log = MemoryStrokeLog::new();
        let room = RoomId::from("r");

        let before = block_on(log.append(&room, new_stroke())).unwrap();
        block_on(log.clear_room(&room)).unwrap();
        assert!(block_on(log.load_all(&room)).unwrap().is_empty());

        let after = block_on(log.append(&room, new_stroke())).unwrap();
        assert!(after.commit_order > before.commit_order);
    }

    #[test]
    fn test_rejects_empty_stroke() {
        let log = MemoryStrokeLog::new();
        let empty = NewStroke::new(AuthorId::from("a"), vec![], Brush::default());
        let result = block_on(log.append(&RoomId::from("r"), empty));
        assert!(matches!(result, Err(StorageError::Rejected(_))));
    }
}
