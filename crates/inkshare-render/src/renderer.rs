//! Drawing surface abstraction.

use kurbo::{Point, Size, Stroke};
use peniko::{Color, Compose};
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Invalid surface size: {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Surface error: {0}")]
    Surface(String),
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RendererError>;

/// A 2D target a [`Frame`](crate::Frame) can be replayed onto.
///
/// Implementations may be a software raster, a GPU scene, or a browser canvas.
/// The size is re-read on every frame, so it must follow the host on resize.
pub trait Surface {
    /// Current size in pixels.
    fn size(&self) -> Size;

    /// Fill the whole surface with `color`, replacing what was there.
    fn clear(&mut self, color: Color);

    /// Stroke an open polyline.
    ///
    /// With [`Compose::DestOut`] the color is ignored and everything under
    /// the stroke is removed.
    fn stroke_polyline(&mut self, points: &[Point], style: &Stroke, color: Color, mode: Compose);

    /// Fill a circle, source-over.
    fn fill_circle(&mut self, center: Point, radius: f64, color: Color);

    /// Draw a single line of text with its baseline starting at `origin`.
    fn draw_text(&mut self, text: &str, origin: Point, font_size: f64, color: Color);
}
