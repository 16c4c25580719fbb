//! Frame compositor.
//!
//! [`compose_frame`] turns committed history, the local in-progress stroke and
//! remote cursors into a display list. It keeps no state between calls: the
//! same input always yields the same [`Frame`].

use crate::renderer::Surface;
use inkshare_core::{CompositeMode, FrameInput, Rgba, StrokeView};
use kurbo::{Cap, Join, Point, Size, Stroke, Vec2};
use peniko::{Color, Compose};

/// Colors and metrics of a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStyle {
    pub background: Rgba,
    /// Fallback for colors that do not parse.
    pub fallback_color: Rgba,
    pub cursor_radius: f64,
    pub label_font_size: f64,
    /// Label position relative to the cursor.
    pub label_offset: Vec2,
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            // #1e293b
            background: Rgba::opaque(0x1e, 0x29, 0x3b),
            fallback_color: Rgba::opaque(0, 0, 0),
            cursor_radius: 8.0,
            label_font_size: 12.0,
            label_offset: Vec2::new(12.0, 4.0),
        }
    }
}

/// One drawing instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear {
        color: Rgba,
    },
    /// Round-capped, round-joined polyline. `color` is `None` for erasers.
    Polyline {
        points: Vec<Point>,
        width: f64,
        color: Option<Rgba>,
        mode: CompositeMode,
    },
    CursorMarker {
        center: Point,
        radius: f64,
        color: Rgba,
    },
    Label {
        text: String,
        origin: Point,
        font_size: f64,
        color: Rgba,
    },
}

/// Display list for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub size: Size,
    pub commands: Vec<DrawCommand>,
}

/// Build the frame for `input`.
///
/// Order: background, committed strokes ascending by commit order, the local
/// stroke, then a marker and a name label per remote cursor. Strokes with
/// fewer than two points are skipped.
pub fn compose_frame(input: &FrameInput<'_>, size: Size, style: &FrameStyle) -> Frame {
    let mut commands = vec![DrawCommand::Clear {
        color: style.background,
    }];

    let strokes = input.history.iter().map(|stroke| stroke.view()).chain(input.local);
    for view in strokes {
        if let Some(command) = polyline(view, style) {
            commands.push(command);
        }
    }

    for cursor in input.cursors.iter() {
        let color = parse_color(&cursor.color, style);
        let center = Point::new(cursor.x, cursor.y);
        commands.push(DrawCommand::CursorMarker {
            center,
            radius: style.cursor_radius,
            color,
        });
        commands.push(DrawCommand::Label {
            text: cursor.display_name.clone(),
            origin: center + style.label_offset,
            font_size: style.label_font_size,
            color,
        });
    }

    Frame { size, commands }
}

fn polyline(view: StrokeView<'_>, style: &FrameStyle) -> Option<DrawCommand> {
    if !view.is_drawable() {
        return None;
    }
    let mode = view.brush.tool.composite_mode();
    let color = match mode {
        CompositeMode::SourceOver => Some(parse_color(view.brush.color.as_str(), style)),
        CompositeMode::DestinationOut => None,
    };
    Some(DrawCommand::Polyline {
        points: view.points.to_vec(),
        width: view.brush.size,
        color,
        mode,
    })
}

fn parse_color(color: &str, style: &FrameStyle) -> Rgba {
    inkshare_core::StrokeColor::new(color).rgba().unwrap_or_else(|| {
        log::debug!("Unparseable color {:?}, using fallback", color);
        style.fallback_color
    })
}

pub(crate) fn to_color(rgba: Rgba) -> Color {
    Color::from_rgba8(rgba.r, rgba.g, rgba.b, rgba.a)
}

fn to_compose(mode: CompositeMode) -> Compose {
    match mode {
        CompositeMode::SourceOver => Compose::SrcOver,
        CompositeMode::DestinationOut => Compose::DestOut,
    }
}

impl Frame {
    /// Draw the frame onto a surface.
    pub fn replay(&self, surface: &mut dyn Surface) {
        for command in &self.commands {
            match command {
                DrawCommand::Clear { color } => surface.clear(to_color(*color)),
                DrawCommand::Polyline {
                    points,
                    width,
                    color,
                    mode,
                } => {
                    let style = Stroke::new(*width).with_caps(Cap::Round).with_join(Join::Round);
                    let color = to_color(color.unwrap_or(Rgba::opaque(0, 0, 0)));
                    surface.stroke_polyline(points, &style, color, to_compose(*mode));
                }
                DrawCommand::CursorMarker { center, radius, color } => {
                    surface.fill_circle(*center, *radius, to_color(*color))
                }
                DrawCommand::Label {
                    text,
                    origin,
                    font_size,
                    color,
                } => surface.draw_text(text, *origin, *font_size, to_color(*color)),
            }
        }
    }

    /// Number of polylines in the frame.
    pub fn stroke_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Polyline { .. }))
            .count()
    }
}
