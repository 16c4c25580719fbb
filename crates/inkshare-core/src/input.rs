//! Pointer events and client-to-canvas coordinate mapping.

use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};

/// Pointer event in canvas pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down { position: Point },
    Move { position: Point },
    Up,
    /// Pointer left the canvas. Finishes the active stroke like `Up`.
    Leave,
}

/// Maps client (CSS) coordinates onto the canvas backing store.
///
/// The backing store may be larger than its on-screen box on HiDPI displays,
/// so positions are scaled by `canvas_size / client_rect.size()`. Both values
/// change on resize and must be updated from the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasMapping {
    /// On-screen box of the canvas element, in client coordinates.
    pub client_rect: Rect,
    /// Backing store size in pixels.
    pub canvas_size: Size,
}

impl CanvasMapping {
    pub fn new(client_rect: Rect, canvas_size: Size) -> Self {
        Self {
            client_rect,
            canvas_size,
        }
    }

    /// A mapping where client and canvas pixels coincide.
    pub fn identity(size: Size) -> Self {
        Self::new(Rect::from_origin_size(Point::ZERO, size), size)
    }

    /// Convert a client position into canvas pixel space.
    pub fn to_canvas(&self, client: Point) -> Point {
        let (sx, sy) = self.scale();
        Point::new(
            (client.x - self.client_rect.x0) * sx,
            (client.y - self.client_rect.y0) * sy,
        )
    }

    /// Per-axis scale from client to canvas pixels. Degenerate boxes map 1:1.
    pub fn scale(&self) -> (f64, f64) {
        let width = self.client_rect.width();
        let height = self.client_rect.height();
        let sx = if width > 0.0 { self.canvas_size.width / width } else { 1.0 };
        let sy = if height > 0.0 { self.canvas_size.height / height } else { 1.0 };
        (sx, sy)
    }

    /// Update after the container was resized.
    pub fn resize(&mut self, client_rect: Rect, canvas_size: Size) {
        self.client_rect = client_rect;
        self.canvas_size = canvas_size;
    }
}
