//! Committed stroke history.
//!
//! Strokes are kept by id for idempotent folding, plus an order index sorted by
//! commit order. Rendering walks the order index, so eraser strokes only remove
//! pixels of strokes committed before them.

use crate::model::{CommitOrder, Stroke, StrokeId};
use std::collections::HashMap;

/// Result of folding a stroke into the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// The stroke was new and has been inserted.
    Inserted,
    /// A stroke with the same id is already present; nothing changed.
    Duplicate,
}

/// Ordered, de-duplicated set of committed strokes for one room.
#[derive(Debug, Clone, Default)]
pub struct CommittedHistory {
    /// All strokes, keyed by id.
    strokes: HashMap<StrokeId, Stroke>,
    /// `(commit order, id)` pairs, ascending.
    order: Vec<(CommitOrder, StrokeId)>,
}

impl CommittedHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from strokes in any order, dropping repeated ids.
    pub fn from_strokes(strokes: impl IntoIterator<Item = Stroke>) -> Self {
        let mut history = Self::new();
        history.seed(strokes);
        history
    }

    /// Replace the whole history, e.g. with the result of a full load.
    pub fn seed(&mut self, strokes: impl IntoIterator<Item = Stroke>) {
        self.clear();
        for stroke in strokes {
            if self.strokes.contains_key(&stroke.id) {
                continue;
            }
            self.order.push((stroke.commit_order, stroke.id));
            self.strokes.insert(stroke.id, stroke);
        }
        self.order.sort_unstable();
    }

    /// Insert a stroke unless its id is already present.
    ///
    /// Late arrivals with a lower commit order are placed before strokes that
    /// were committed after them.
    pub fn fold_insert(&mut self, stroke: Stroke) -> FoldOutcome {
        if self.strokes.contains_key(&stroke.id) {
            return FoldOutcome::Duplicate;
        }
        let key = (stroke.commit_order, stroke.id);
        let index = self.order.partition_point(|entry| *entry < key);
        self.order.insert(index, key);
        self.strokes.insert(stroke.id, stroke);
        FoldOutcome::Inserted
    }

    /// Remove every stroke.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.order.clear();
    }

    /// Strokes in ascending commit order.
    pub fn iter(&self) -> impl Iterator<Item = &Stroke> {
        self.order.iter().filter_map(|(_, id)| self.strokes.get(id))
    }

    pub fn get(&self, id: StrokeId) -> Option<&Stroke> {
        self.strokes.get(&id)
    }

    pub fn contains(&self, id: StrokeId) -> bool {
        self.strokes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Highest commit order present, if any.
    pub fn high_water(&self) -> Option<CommitOrder> {
        self.order.last().map(|(order, _)| *order)
    }
}
