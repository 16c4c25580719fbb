//! Local, not yet committed stroke.

use crate::model::{AuthorId, Brush, NewStroke, StrokeView};
use kurbo::Point;

/// Captures pointer input between press and release.
///
/// The in-progress points are rendered every frame with the current brush,
/// so a brush change mid-stroke is visible immediately and is what the
/// finalized stroke carries.
#[derive(Debug, Clone)]
pub struct LocalDrawSession {
    author_id: AuthorId,
    /// Current tool, color and size.
    brush: Brush,
    /// Points of the active stroke; `None` while idle.
    buffer: Option<Vec<Point>>,
}

impl LocalDrawSession {
    pub fn new(author_id: AuthorId, brush: Brush) -> Self {
        Self {
            author_id,
            brush,
            buffer: None,
        }
    }

    /// Start a stroke at `point`, discarding any unfinished one.
    pub fn begin(&mut self, point: Point) {
        self.buffer = Some(vec![point]);
    }

    /// Append a point to the active stroke. Does nothing while idle.
    pub fn extend(&mut self, point: Point) {
        if let Some(points) = self.buffer.as_mut() {
            points.push(point);
        }
    }

    /// Finish the active stroke.
    ///
    /// Returns `None` when no stroke is active or it has no points.
    pub fn end(&mut self) -> Option<NewStroke> {
        let points = self.buffer.take()?;
        if points.is_empty() {
            return None;
        }
        Some(NewStroke::new(self.author_id.clone(), points, self.brush.clone()))
    }

    /// Drop the active stroke without finalizing it.
    pub fn cancel(&mut self) {
        self.buffer = None;
    }

    pub fn is_active(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn set_brush(&mut self, brush: Brush) {
        self.brush = brush;
    }

    /// The active stroke as it should be drawn this frame.
    pub fn in_progress(&self) -> Option<StrokeView<'_>> {
        let points = self.buffer.as_deref()?;
        if points.is_empty() {
            return None;
        }
        Some(StrokeView {
            points,
            brush: &self.brush,
        })
    }
}
