//! Stroke, brush and identity definitions for the shared canvas.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Toolbar pen colors, in display order.
pub const PEN_COLORS: [&str; 8] = [
    "#06b6d4", // cyan
    "#f43f5e", // rose
    "#22c55e", // green
    "#f59e0b", // amber
    "#8b5cf6", // violet
    "#ec4899", // pink
    "#ffffff", // white
    "#000000", // black
];

/// Colors handed out to participants when they join.
pub const PARTICIPANT_COLORS: [&str; 8] = [
    "#06b6d4", "#f43f5e", "#22c55e", "#f59e0b", "#8b5cf6", "#ec4899", "#3b82f6", "#ef4444",
];

/// Selectable line widths.
pub const BRUSH_SIZES: [f64; 4] = [2.0, 4.0, 8.0, 16.0];

/// Unique identifier of a stroke. Generated locally when a stroke is finalized.
pub type StrokeId = Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a participant. Strokes and cursors carry their author's id.
    AuthorId
);

string_id!(
    /// Scoping key for the stroke log, the change feed and the presence channel.
    RoomId
);

/// Position of a stroke in its room's durable log. Assigned by the log on append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitOrder(pub u64);

impl CommitOrder {
    pub const ZERO: CommitOrder = CommitOrder(0);

    /// The order directly after this one.
    pub fn next(self) -> Self {
        CommitOrder(self.0 + 1)
    }
}

/// Drawing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    #[default]
    Pen,
    Eraser,
}

impl ToolKind {
    /// Compositing mode used when this tool's strokes are drawn.
    pub fn composite_mode(self) -> CompositeMode {
        match self {
            ToolKind::Pen => CompositeMode::SourceOver,
            ToolKind::Eraser => CompositeMode::DestinationOut,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Pen => "Pen",
            ToolKind::Eraser => "Eraser",
        }
    }
}

/// How a stroke combines with pixels drawn before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    /// Paint over existing pixels.
    SourceOver,
    /// Remove existing pixels under the stroke, ignoring its color.
    DestinationOut,
}

/// RGBA8 color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const WHITE: Rgba = Rgba::opaque(255, 255, 255);
}

/// CSS color string as carried on the wire (`"#06b6d4"`, `"red"`, `"rgb(...)"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeColor(pub String);

impl StrokeColor {
    pub fn new(color: impl Into<String>) -> Self {
        Self(color.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into RGBA8. Returns `None` for strings that are not CSS colors.
    pub fn rgba(&self) -> Option<Rgba> {
        let [r, g, b, a] = csscolorparser::parse(&self.0).ok()?.to_rgba8();
        Some(Rgba { r, g, b, a })
    }
}

impl Default for StrokeColor {
    fn default() -> Self {
        Self::new(PEN_COLORS[0])
    }
}

impl From<&str> for StrokeColor {
    fn from(color: &str) -> Self {
        Self::new(color)
    }
}

/// Current tool, color and line width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    pub color: StrokeColor,
    /// Line width in canvas pixels.
    pub size: f64,
    pub tool: ToolKind,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            color: StrokeColor::default(),
            size: 4.0,
            tool: ToolKind::Pen,
        }
    }
}

impl Brush {
    pub fn pen(color: impl Into<StrokeColor>, size: f64) -> Self {
        Self {
            color: color.into(),
            size,
            tool: ToolKind::Pen,
        }
    }

    pub fn eraser(size: f64) -> Self {
        Self {
            tool: ToolKind::Eraser,
            size,
            ..Self::default()
        }
    }

    /// Check that the line width is a positive finite number.
    pub fn validate(&self) -> Result<(), String> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(format!("stroke size must be positive, got {}", self.size));
        }
        Ok(())
    }
}

impl From<String> for StrokeColor {
    fn from(color: String) -> Self {
        Self(color)
    }
}

/// Borrowed view of a stroke's geometry and style, used for rendering.
#[derive(Debug, Clone, Copy)]
pub struct StrokeView<'a> {
    pub points: &'a [Point],
    pub brush: &'a Brush,
}

impl StrokeView<'_> {
    /// Strokes with fewer than two points have no visible polyline.
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }
}

/// A finalized stroke that has not been acknowledged by the stroke log yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStroke {
    pub id: StrokeId,
    pub author_id: AuthorId,
    pub points: Vec<Point>,
    #[serde(flatten)]
    pub brush: Brush,
}

impl NewStroke {
    /// Create a stroke with a fresh id.
    pub fn new(author_id: AuthorId, points: Vec<Point>, brush: Brush) -> Self {
        Self {
            id: Uuid::new_v4(),
            author_id,
            points,
            brush,
        }
    }

    /// Attach the order assigned by the log.
    pub fn commit(self, commit_order: CommitOrder) -> Stroke {
        Stroke {
            id: self.id,
            author_id: self.author_id,
            points: self.points,
            brush: self.brush,
            commit_order,
        }
    }

    /// Check the stroke can be stored: at least one point and a valid brush.
    pub fn validate(&self) -> Result<(), String> {
        if self.points.is_empty() {
            return Err("stroke has no points".to_string());
        }
        self.brush.validate()
    }

    pub fn view(&self) -> StrokeView<'_> {
        StrokeView {
            points: &self.points,
            brush: &self.brush,
        }
    }
}

/// A stroke in the durable log. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub author_id: AuthorId,
    pub points: Vec<Point>,
    #[serde(flatten)]
    pub brush: Brush,
    pub commit_order: CommitOrder,
}

impl Stroke {
    pub fn view(&self) -> StrokeView<'_> {
        StrokeView {
            points: &self.points,
            brush: &self.brush,
        }
    }

    pub fn tool(&self) -> ToolKind {
        self.brush.tool
    }
}

/// Who the local participant is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub author_id: AuthorId,
    pub display_name: String,
    pub color: String,
}

impl Identity {
    pub fn new(author_id: impl Into<String>, display_name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            author_id: AuthorId::new(author_id),
            display_name: display_name.into(),
            color: color.into(),
        }
    }

    /// Create an identity with a random `user-xxxxxxxxx` id and a participant color.
    pub fn generate(display_name: impl Into<String>) -> Self {
        let uuid = Uuid::new_v4();
        let simple = uuid.simple().to_string();
        let color = PARTICIPANT_COLORS[uuid.as_bytes()[0] as usize % PARTICIPANT_COLORS.len()];
        Self::new(format!("user-{}", &simple[..9]), display_name, color)
    }
}
