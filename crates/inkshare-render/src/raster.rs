//! Software RGBA8 surface.
//!
//! Good enough for snapshots and tests: polylines are rasterized as unions of
//! round-capped capsules with one pixel of analytic anti-aliasing. Text is not
//! rasterized; labels are recorded and can be read back with
//! [`RasterSurface::labels`].

use crate::renderer::{RenderResult, RendererError, Surface};
use inkshare_core::Rgba;
use kurbo::{Line, ParamCurveNearest, Point, Rect, Size, Stroke};
use peniko::{Color, Compose};

/// A text run recorded by [`RasterSurface::draw_text`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub origin: Point,
    pub font_size: f64,
    pub color: Rgba,
}

/// In-memory RGBA8 image with straight alpha.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    labels: Vec<TextRun>,
}

impl RasterSurface {
    /// Create a transparent surface.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RendererError::InvalidSize { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            labels: Vec::new(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 rows, top to bottom.
    pub fn data(&self) -> &[u8] {
        &self.pixels
    }

    /// Color of the pixel at `(x, y)`, or `None` outside the surface.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        let p = &self.pixels[i..i + 4];
        Some(Rgba::new(p[0], p[1], p[2], p[3]))
    }

    /// Text runs drawn since the last clear.
    pub fn labels(&self) -> &[TextRun] {
        &self.labels
    }

    /// Encode the surface as PNG.
    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        let mut png_data = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut png_data, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder
                .write_header()
                .map_err(|e| RendererError::Encode(format!("Failed to write PNG header: {}", e)))?;
            writer
                .write_image_data(&self.pixels)
                .map_err(|e| RendererError::Encode(format!("Failed to write PNG data: {}", e)))?;
        }
        Ok(png_data)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Visit every pixel whose center lies in `bounds`, clipped to the surface.
    fn for_each_in(&mut self, bounds: Rect, mut f: impl FnMut(Point, &mut [u8])) {
        let x0 = bounds.x0.floor().max(0.0) as u32;
        let y0 = bounds.y0.floor().max(0.0) as u32;
        let x1 = (bounds.x1.ceil().max(0.0) as u32).min(self.width);
        let y1 = (bounds.y1.ceil().max(0.0) as u32).min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let center = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let i = self.offset(x, y);
                f(center, &mut self.pixels[i..i + 4]);
            }
        }
    }
}

/// Coverage of a pixel at signed distance `distance - radius` from an edge.
fn coverage(distance: f64, radius: f64) -> f32 {
    (radius + 0.5 - distance).clamp(0.0, 1.0) as f32
}

fn rgba8(color: Color) -> [u8; 4] {
    let c = color.to_rgba8();
    [c.r, c.g, c.b, c.a]
}

/// Source-over with straight alpha.
fn blend_over(dst: &mut [u8], src: [u8; 4], coverage: f32) {
    let sa = src[3] as f32 / 255.0 * coverage;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let sc = src[c] as f32;
        let dc = dst[c] as f32;
        dst[c] = ((sc * sa + dc * da * (1.0 - sa)) / out_a).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Destination-out: remove `coverage` of whatever is there.
fn erase(dst: &mut [u8], coverage: f32) {
    if coverage <= 0.0 {
        return;
    }
    let a = (dst[3] as f32 * (1.0 - coverage)).round() as u8;
    if a == 0 {
        dst.copy_from_slice(&[0, 0, 0, 0]);
    } else {
        dst[3] = a;
    }
}

impl Surface for RasterSurface {
    fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }

    fn clear(&mut self, color: Color) {
        let rgba = rgba8(color);
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
        self.labels.clear();
    }

    fn stroke_polyline(&mut self, points: &[Point], style: &Stroke, color: Color, mode: Compose) {
        if points.len() < 2 {
            return;
        }
        let radius = style.width / 2.0;
        let segments: Vec<Line> = points.windows(2).map(|w| Line::new(w[0], w[1])).collect();
        let bounds = points
            .iter()
            .fold(Rect::from_points(points[0], points[0]), |r, p| r.union_pt(*p))
            .inflate(radius + 1.0, radius + 1.0);

        let src = rgba8(color);
        // Covering the whole stroke at once keeps overlapping segments from
        // blending twice.
        self.for_each_in(bounds, |center, pixel| {
            let distance = segments
                .iter()
                .map(|segment| segment.nearest(center, 1e-6).distance_sq)
                .fold(f64::INFINITY, f64::min)
                .sqrt();
            let cov = coverage(distance, radius);
            match mode {
                Compose::DestOut => erase(pixel, cov),
                Compose::SrcOver => blend_over(pixel, src, cov),
                other => {
                    log::debug!("Unsupported compose mode {:?}, drawing source-over", other);
                    blend_over(pixel, src, cov)
                }
            }
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Color) {
        let src = rgba8(color);
        let bounds = Rect::from_center_size(center, Size::new(radius * 2.0 + 2.0, radius * 2.0 + 2.0));
        self.for_each_in(bounds, |p, pixel| {
            blend_over(pixel, src, coverage(p.distance(center), radius));
        });
    }

    fn draw_text(&mut self, text: &str, origin: Point, font_size: f64, color: Color) {
        let c = rgba8(color);
        self.labels.push(TextRun {
            text: text.to_string(),
            origin,
            font_size,
            color: Rgba::new(c[0], c[1], c[2], c[3]),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Cap, Join};

    fn red() -> Color {
        Color::from_rgba8(255, 0, 0, 255)
    }

    #[test]
    fn test_zero_size_is_rejected() {
        assert!(matches!(
            RasterSurface::new(0, 10),
            Err(RendererError::InvalidSize { width: 0, height: 10 })
        ));
    }

    #[test]
    fn test_clear_fills_every_pixel() {
        let mut surface = RasterSurface::new(4, 3).unwrap();
        surface.clear(Color::from_rgba8(30, 41, 59, 255));
        assert_eq!(surface.pixel(3, 2), Some(Rgba::opaque(30, 41, 59)));
        assert_eq!(surface.pixel(4, 0), None);
    }

    #[test]
    fn test_stroke_covers_segment_and_caps() {
        let mut surface = RasterSurface::new(20, 20).unwrap();
        let style = Stroke::new(4.0).with_caps(Cap::Round).with_join(Join::Round);
        surface.stroke_polyline(
            &[Point::new(5.0, 10.0), Point::new(15.0, 10.0)],
            &style,
            red(),
            Compose::SrcOver,
        );
        assert_eq!(surface.pixel(10, 10), Some(Rgba::opaque(255, 0, 0)));
        // Round cap reaches past the end point.
        assert_eq!(surface.pixel(15, 10).map(|p| p.a), Some(255));
        assert_eq!(surface.pixel(10, 2).map(|p| p.a), Some(0));
    }

    #[test]
    fn test_dest_out_clears_alpha() {
        let mut surface = RasterSurface::new(20, 20).unwrap();
        surface.clear(Color::from_rgba8(255, 255, 255, 255));
        let style = Stroke::new(6.0);
        surface.stroke_polyline(
            &[Point::new(0.0, 10.0), Point::new(20.0, 10.0)],
            &style,
            red(),
            Compose::DestOut,
        );
        assert_eq!(surface.pixel(10, 10), Some(Rgba::TRANSPARENT));
        assert_eq!(surface.pixel(10, 0), Some(Rgba::WHITE));
    }

    #[test]
    fn test_single_point_polyline_is_ignored() {
        let mut surface = RasterSurface::new(8, 8).unwrap();
        surface.stroke_polyline(&[Point::new(4.0, 4.0)], &Stroke::new(4.0), red(), Compose::SrcOver);
        assert!(surface.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_png_signature() {
        let mut surface = RasterSurface::new(2, 2).unwrap();
        surface.clear(red());
        let png = surface.encode_png().unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[test]
    fn test_labels_are_recorded_and_reset_on_clear() {
        let mut surface = RasterSurface::new(8, 8).unwrap();
        surface.draw_text("Ann", Point::new(1.0, 2.0), 12.0, red());
        assert_eq!(surface.labels()[0].text, "Ann");
        surface.clear(red());
        assert!(surface.labels().is_empty());
    }
}
