//! InkShare Render Library
//!
//! Frame compositor and drawing surfaces for InkShare. Frames are built as
//! plain display lists so any backend implementing [`Surface`] can draw them.

mod compositor;
mod raster;
mod renderer;

pub use compositor::{DrawCommand, Frame, FrameStyle, compose_frame};
pub use raster::{RasterSurface, TextRun};
pub use renderer::{RenderResult, RendererError, Surface};
