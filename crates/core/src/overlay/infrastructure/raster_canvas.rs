//! Software [`Canvas`] on `image` buffers, rasterized with `imageproc`.
//!
//! Draws land on a transparent overlay layer. Draws made while a shadow is
//! set are repeated on a glow layer per blur radius; [`RasterCanvas::composite`]
//! blurs those and stacks video, glow and overlay.
use std::collections::BTreeMap;

use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_polygon_mut, Blend,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::overlay::domain::canvas::{Canvas, Color, Shadow, Stroke, TextStyle};
use crate::overlay::domain::transform::Transform;
use crate::shared::frame::Frame;

use super::bitmap_font::{lit_cells, GLYPH_HEIGHT};

#[derive(Clone, Copy)]
struct DrawState {
    transform: Transform,
    shadow: Option<Shadow>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Transform::IDENTITY,
            shadow: None,
        }
    }
}

pub struct RasterCanvas {
    width: u32,
    height: u32,
    overlay: Blend<RgbaImage>,
    /// Glow layers keyed by blur radius in whole pixels.
    glow: BTreeMap<u32, Blend<RgbaImage>>,
    state: DrawState,
    stack: Vec<DrawState>,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            overlay: Blend(RgbaImage::new(width, height)),
            glow: BTreeMap::new(),
            state: DrawState::default(),
            stack: Vec::new(),
        }
    }

    /// The un-blurred overlay layer, without glow or video.
    pub fn overlay(&self) -> &RgbaImage {
        &self.overlay.0
    }

    /// Horizontally mirrored `frame` with the blurred glow and the overlay
    /// on top. The video is scaled to the canvas size if they differ.
    pub fn composite(&self, frame: &Frame) -> RgbaImage {
        let mut out = video_layer(frame, self.width, self.height);
        for (&blur, layer) in &self.glow {
            let glow = blur_glow(&layer.0, blur);
            image::imageops::overlay(&mut out, &glow, 0, 0);
        }
        image::imageops::overlay(&mut out, &self.overlay.0, 0, 0);
        out
    }

    /// Runs `draw` on the overlay and, when a shadow is set, again on the
    /// matching glow layer in the shadow colour.
    fn paint(&mut self, color: Color, draw: impl Fn(&mut Blend<RgbaImage>, Rgba<u8>)) {
        if let Some(shadow) = self.state.shadow {
            let blur = shadow.blur.round().max(0.0) as u32;
            if blur > 0 && shadow.color.a > 0.0 {
                let (w, h) = (self.width, self.height);
                let layer = self
                    .glow
                    .entry(blur)
                    .or_insert_with(|| Blend(RgbaImage::new(w, h)));
                draw(layer, Rgba(shadow.color.to_rgba8()));
            }
        }
        if color.a > 0.0 {
            draw(&mut self.overlay, Rgba(color.to_rgba8()));
        }
    }

    /// Device-space rectangle spanning two transformed corners.
    fn device_rect(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> (f64, f64, f64, f64) {
        let t = self.state.transform;
        let (ax, ay) = t.apply(x0, y0);
        let (bx, by) = t.apply(x1, y1);
        (ax.min(bx), ay.min(by), ax.max(bx), ay.max(by))
    }
}

impl Canvas for RasterCanvas {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    fn save(&mut self) {
        self.stack.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn reset_transform(&mut self) {
        self.stack.clear();
        self.state = DrawState::default();
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.state.transform = self.state.transform.then_translate(dx, dy);
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.state.transform = self.state.transform.then_scale(sx, sy);
    }

    fn transform(&self) -> Transform {
        self.state.transform
    }

    fn set_shadow(&mut self, shadow: Option<Shadow>) {
        self.state.shadow = shadow;
    }

    fn clear(&mut self) {
        self.overlay = Blend(RgbaImage::new(self.width, self.height));
        self.glow.clear();
    }

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: Color) {
        let t = self.state.transform;
        let (cx, cy) = t.apply(x, y);
        let r = (radius * t.length_scale()).round().max(1.0) as i32;
        let center = (cx.round() as i32, cy.round() as i32);
        self.paint(color, |layer, px| {
            draw_filled_circle_mut(layer, center, r, px);
        });
    }

    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, stroke: Stroke) {
        let (x0, y0, x1, y1) = self.device_rect(x, y, x + width, y + height);
        let line = (stroke.width * self.state.transform.length_scale()).round().max(1.0) as i32;
        if line <= 1 {
            let (w, h) = (((x1 - x0).round() as u32).max(1), ((y1 - y0).round() as u32).max(1));
            let rect = Rect::at(x0.round() as i32, y0.round() as i32).of_size(w, h);
            self.paint(stroke.color, |layer, px| draw_hollow_rect_mut(layer, rect, px));
        } else {
            let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)];
            let saved = self.state.transform;
            self.state.transform = Transform::IDENTITY;
            self.stroke_polyline(&corners, Stroke { width: line as f64, ..stroke });
            self.state.transform = saved;
        }
    }

    fn stroke_polyline(&mut self, points: &[(f64, f64)], stroke: Stroke) {
        let t = self.state.transform;
        let half = (stroke.width * t.length_scale() / 2.0).max(0.5);
        let device: Vec<(f64, f64)> = points.iter().map(|&(x, y)| t.apply(x, y)).collect();
        for pair in device.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            self.paint(stroke.color, |layer, px| thick_segment(layer, a, b, half, px));
        }
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: TextStyle) {
        let cell = style.size / GLYPH_HEIGHT as f64;
        let top = y - style.size;
        let rects: Vec<Rect> = lit_cells(text)
            .filter_map(|(col, row)| {
                let lx = x + col as f64 * cell;
                let ly = top + row as f64 * cell;
                let (x0, y0, x1, y1) = self.device_rect(lx, ly, lx + cell, ly + cell);
                let (ix0, iy0) = (x0.round() as i32, y0.round() as i32);
                let (ix1, iy1) = (x1.round() as i32, y1.round() as i32);
                (ix1 > ix0 && iy1 > iy0)
                    .then(|| Rect::at(ix0, iy0).of_size((ix1 - ix0) as u32, (iy1 - iy0) as u32))
            })
            .collect();
        self.paint(style.color, |layer, px| {
            for rect in &rects {
                draw_filled_rect_mut(layer, *rect, px);
            }
        });
    }
}

/// Fills the quad around segment `a → b` with half-width `half`.
fn thick_segment(
    layer: &mut Blend<RgbaImage>,
    a: (f64, f64),
    b: (f64, f64),
    half: f64,
    px: Rgba<u8>,
) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < f64::EPSILON {
        return;
    }
    // Extend along the segment so consecutive segments meet at square joins.
    let (ux, uy) = (dx / len * half, dy / len * half);
    let (nx, ny) = (-uy, ux);
    let quad = [
        (a.0 - ux + nx, a.1 - uy + ny),
        (b.0 + ux + nx, b.1 + uy + ny),
        (b.0 + ux - nx, b.1 + uy - ny),
        (a.0 - ux - nx, a.1 - uy - ny),
    ];
    let points: Vec<Point<i32>> = quad
        .iter()
        .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
        .collect();
    if points[0] == points[3] || points[0] == points[1] {
        draw_line_segment_mut(layer, (a.0 as f32, a.1 as f32), (b.0 as f32, b.1 as f32), px);
    } else {
        draw_polygon_mut(layer, &points, px);
    }
}

fn video_layer(frame: &Frame, width: u32, height: u32) -> RgbaImage {
    let mut video = RgbaImage::new(frame.width(), frame.height());
    let channels = (frame.channels() as usize).max(1);
    for (pixel, src) in video.pixels_mut().zip(frame.data().chunks_exact(channels)) {
        *pixel = match src {
            [r, g, b, ..] => Rgba([*r, *g, *b, 255]),
            [gray, ..] => Rgba([*gray, *gray, *gray, 255]),
            [] => Rgba([0, 0, 0, 255]),
        };
    }
    image::imageops::flip_horizontal_in_place(&mut video);
    if (video.width(), video.height()) != (width, height) && width > 0 && height > 0 {
        video = image::imageops::resize(
            &video,
            width,
            height,
            image::imageops::FilterType::Triangle,
        );
    }
    video
}

/// Gaussian blur with sigma = blur / 2, on premultiplied alpha so
/// transparent surroundings do not darken the glow.
fn blur_glow(layer: &RgbaImage, blur: u32) -> RgbaImage {
    let sigma = blur as f32 / 2.0;
    if sigma <= 0.0 {
        return layer.clone();
    }
    let mut premultiplied = layer.clone();
    for p in premultiplied.pixels_mut() {
        let a = p[3] as u32;
        for c in 0..3 {
            p[c] = ((p[c] as u32 * a + 127) / 255) as u8;
        }
    }
    let mut blurred = imageproc::filter::gaussian_blur_f32(&premultiplied, sigma);
    for p in blurred.pixels_mut() {
        let a = p[3] as u32;
        if a == 0 {
            continue;
        }
        for c in 0..3 {
            p[c] = ((p[c] as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
    blurred
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const ACCENT: Color = Color::rgb(0x00, 0xf2, 0xfe);

    fn alpha_at(canvas: &RasterCanvas, x: u32, y: u32) -> u8 {
        canvas.overlay().get_pixel(x, y)[3]
    }

    fn mirrored(width: u32, height: u32) -> RasterCanvas {
        let mut canvas = RasterCanvas::new(width, height);
        canvas.translate(width as f64, 0.0);
        canvas.scale(-1.0, 1.0);
        canvas
    }

    // ── Primitives ──

    #[test]
    fn test_circle_lands_mirrored() {
        let mut canvas = mirrored(100, 50);
        canvas.fill_circle(10.0, 25.0, 2.0, ACCENT);
        assert_eq!(alpha_at(&canvas, 90, 25), 255);
        assert_eq!(alpha_at(&canvas, 10, 25), 0);
    }

    #[test]
    fn test_thick_polyline_covers_width() {
        let mut canvas = RasterCanvas::new(50, 50);
        let stroke = Stroke { color: ACCENT, width: 3.0 };
        canvas.stroke_polyline(&[(10.0, 10.0), (30.0, 10.0)], stroke);
        assert_eq!(alpha_at(&canvas, 20, 9), 255);
        assert_eq!(alpha_at(&canvas, 20, 11), 255);
        assert_eq!(alpha_at(&canvas, 20, 20), 0);
    }

    #[test]
    fn test_hollow_rect_is_translucent_and_empty_inside() {
        let mut canvas = RasterCanvas::new(50, 50);
        let stroke = Stroke { color: ACCENT.with_alpha(0.3), width: 1.0 };
        canvas.stroke_rect(10.0, 10.0, 20.0, 20.0, stroke);
        assert!((76..=77).contains(&alpha_at(&canvas, 20, 10)));
        assert_eq!(alpha_at(&canvas, 20, 20), 0);
    }

    #[test]
    fn test_text_reads_left_to_right_under_double_flip() {
        let mut canvas = mirrored(200, 40);
        canvas.translate(50.0, 30.0);
        canvas.scale(-1.0, 1.0);
        let style = TextStyle { color: ACCENT, size: 14.0 };
        // "I" has a full-width top bar at columns 1..=3 of the glyph.
        canvas.fill_text("I", 0.0, 0.0, style);

        // Local origin (0, 0) maps to device x = 200 - 50 = 150, y = 30.
        // Top row spans y 16..18 and glyph columns 1..4 → x 152..158.
        assert_eq!(alpha_at(&canvas, 153, 16), 255);
        assert_eq!(alpha_at(&canvas, 157, 17), 255);
        assert_eq!(alpha_at(&canvas, 149, 16), 0);
    }

    // ── State ──

    #[test]
    fn test_save_restore_and_reset() {
        let mut canvas = RasterCanvas::new(10, 10);
        canvas.save();
        canvas.translate(3.0, 4.0);
        canvas.restore();
        assert_eq!(canvas.transform(), Transform::IDENTITY);

        canvas.save();
        canvas.scale(-1.0, 1.0);
        canvas.reset_transform();
        assert_eq!(canvas.transform(), Transform::IDENTITY);
        canvas.restore(); // empty stack is a no-op
        assert_eq!(canvas.transform(), Transform::IDENTITY);
    }

    #[test]
    fn test_clear_and_resize() {
        let mut canvas = RasterCanvas::new(20, 20);
        canvas.fill_circle(10.0, 10.0, 3.0, ACCENT);
        canvas.clear();
        assert!(canvas.overlay().pixels().all(|p| p[3] == 0));

        canvas.resize(40, 30);
        assert_eq!((canvas.width(), canvas.height()), (40, 30));
        assert_eq!(canvas.overlay().dimensions(), (40, 30));
    }

    // ── Composite ──

    #[test]
    fn test_composite_mirrors_video_and_keeps_size() {
        let (w, h) = (4u32, 2u32);
        let mut data = vec![0u8; (w * h * 3) as usize];
        data[0] = 255; // red at top-left
        let frame = Frame::new(data, w, h, 3, Duration::ZERO);
        let canvas = RasterCanvas::new(w, h);

        let out = canvas.composite(&frame);
        assert_eq!(out.dimensions(), (w, h));
        assert_eq!(out.get_pixel(w - 1, 0).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_glow_spreads_beyond_shape() {
        let frame = Frame::new(vec![0u8; 40 * 40 * 3], 40, 40, 3, Duration::ZERO);
        let mut canvas = RasterCanvas::new(40, 40);
        canvas.set_shadow(Some(Shadow { blur: 10.0, color: ACCENT }));
        canvas.fill_circle(20.0, 20.0, 2.0, ACCENT);

        let out = canvas.composite(&frame);
        // Outside the disc but inside the glow.
        let p = out.get_pixel(26, 20);
        assert!(p[1] > 0 && p[2] > 0);
        assert_eq!(alpha_at(&canvas, 26, 20), 0);
    }
}
