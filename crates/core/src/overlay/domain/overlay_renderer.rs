use crate::detection::domain::face_landmarks::{DetectionResult, Face};
use crate::shared::bounding_box::{BoundingBox, PixelRect};

use super::canvas::Canvas;
use super::overlay_style::OverlayStyle;

/// Draws detection results as a mirrored HUD onto an owned canvas.
///
/// The whole canvas is flipped horizontally once per render so the overlay
/// lines up with a selfie-style mirrored video. The label is flipped back
/// locally so it reads left to right.
pub struct OverlayRenderer<C: Canvas> {
    canvas: C,
    style: OverlayStyle,
}

impl<C: Canvas> OverlayRenderer<C> {
    pub fn new(canvas: C, style: OverlayStyle) -> Self {
        Self { canvas, style }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Replaces the canvas content with `result`. Zero faces leaves the
    /// canvas cleared.
    pub fn render(&mut self, result: &DetectionResult) {
        let width = self.canvas.width();
        let height = self.canvas.height();

        self.canvas.reset_transform();
        self.canvas.clear();

        self.canvas.save();
        self.canvas.translate(width as f64, 0.0);
        self.canvas.scale(-1.0, 1.0);
        for face in &result.faces {
            self.draw_face(face, width, height);
        }
        self.canvas.restore();
    }

    fn draw_face(&mut self, face: &Face, width: u32, height: u32) {
        let Some(bbox) = BoundingBox::from_face(face) else {
            return;
        };
        let (w, h) = (width as f64, height as f64);

        self.canvas.set_shadow(Some(self.style.landmark_shadow()));
        for l in face.landmarks() {
            self.canvas
                .fill_circle(l.x * w, l.y * h, self.style.landmark_radius, self.style.accent);
        }

        let rect = bbox.padded(self.style.box_padding).to_pixels(width, height);
        self.draw_box(&rect);
        self.draw_label(&rect);
    }

    fn draw_box(&mut self, rect: &PixelRect) {
        self.canvas.save();
        self.canvas.set_shadow(Some(self.style.box_shadow()));
        self.canvas
            .stroke_rect(rect.x, rect.y, rect.width, rect.height, self.style.box_stroke());

        let stroke = self.style.corner_stroke();
        for corner in corner_paths(rect, self.style.corner_length) {
            self.canvas.stroke_polyline(&corner, stroke);
        }
        self.canvas.restore();
    }

    fn draw_label(&mut self, rect: &PixelRect) {
        self.canvas.save();
        self.canvas.translate(rect.x, rect.y);
        self.canvas.scale(-1.0, 1.0);
        self.canvas.set_shadow(None);
        self.canvas.fill_text(
            &self.style.label,
            -rect.width,
            self.style.label_offset_y,
            self.style.label_style(),
        );
        self.canvas.restore();
    }
}

/// Four L-shaped accents, each a two-segment path through one box corner.
pub fn corner_paths(rect: &PixelRect, len: f64) -> [[(f64, f64); 3]; 4] {
    let (x, y, r, b) = (rect.x, rect.y, rect.right(), rect.bottom());
    [
        [(x, y + len), (x, y), (x + len, y)],
        [(r - len, y), (r, y), (r, y + len)],
        [(x, b - len), (x, b), (x + len, b)],
        [(r - len, b), (r, b), (r, b - len)],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_landmarks::Landmark;
    use crate::overlay::domain::canvas::{Color, Shadow, Stroke, TextStyle};
    use crate::overlay::domain::transform::Transform;
    use approx::assert_relative_eq;

    #[derive(Clone, Debug, PartialEq)]
    enum Op {
        Clear,
        Circle { at: (f64, f64), shadow: Option<Shadow> },
        Rect { x: f64, y: f64, w: f64, h: f64, t: Transform, shadow: Option<Shadow> },
        Polyline { points: Vec<(f64, f64)>, stroke: Stroke },
        Text { text: String, x: f64, y: f64, t: Transform, shadow: Option<Shadow> },
    }

    struct RecordingCanvas {
        width: u32,
        height: u32,
        transform: Transform,
        shadow: Option<Shadow>,
        stack: Vec<(Transform, Option<Shadow>)>,
        ops: Vec<Op>,
    }

    impl RecordingCanvas {
        fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                transform: Transform::IDENTITY,
                shadow: None,
                stack: Vec::new(),
                ops: Vec::new(),
            }
        }
    }

    impl Canvas for RecordingCanvas {
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.width = width;
            self.height = height;
        }
        fn save(&mut self) {
            self.stack.push((self.transform, self.shadow));
        }
        fn restore(&mut self) {
            if let Some((t, s)) = self.stack.pop() {
                self.transform = t;
                self.shadow = s;
            }
        }
        fn reset_transform(&mut self) {
            self.stack.clear();
            self.transform = Transform::IDENTITY;
            self.shadow = None;
        }
        fn translate(&mut self, dx: f64, dy: f64) {
            self.transform = self.transform.then_translate(dx, dy);
        }
        fn scale(&mut self, sx: f64, sy: f64) {
            self.transform = self.transform.then_scale(sx, sy);
        }
        fn transform(&self) -> Transform {
            self.transform
        }
        fn set_shadow(&mut self, shadow: Option<Shadow>) {
            self.shadow = shadow;
        }
        fn clear(&mut self) {
            self.ops.push(Op::Clear);
        }
        fn fill_circle(&mut self, x: f64, y: f64, _radius: f64, _color: Color) {
            self.ops.push(Op::Circle {
                at: self.transform.apply(x, y),
                shadow: self.shadow,
            });
        }
        fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64, _stroke: Stroke) {
            self.ops.push(Op::Rect { x, y, w, h, t: self.transform, shadow: self.shadow });
        }
        fn stroke_polyline(&mut self, points: &[(f64, f64)], stroke: Stroke) {
            self.ops.push(Op::Polyline { points: points.to_vec(), stroke });
        }
        fn fill_text(&mut self, text: &str, x: f64, y: f64, _style: TextStyle) {
            self.ops.push(Op::Text {
                text: text.to_string(),
                x,
                y,
                t: self.transform,
                shadow: self.shadow,
            });
        }
    }

    fn renderer(width: u32, height: u32) -> OverlayRenderer<RecordingCanvas> {
        OverlayRenderer::new(RecordingCanvas::new(width, height), OverlayStyle::default())
    }

    fn face(points: &[(f64, f64)]) -> Face {
        Face::new(points.iter().map(|&(x, y)| Landmark::new(x, y)).collect())
    }

    fn texts(ops: &[Op]) -> Vec<&Op> {
        ops.iter().filter(|op| matches!(op, Op::Text { .. })).collect()
    }

    // ── Clearing ──

    #[test]
    fn test_zero_faces_only_clears() {
        let mut r = renderer(640, 480);
        r.render(&DetectionResult::empty());
        assert_eq!(r.canvas().ops, vec![Op::Clear]);
    }

    #[test]
    fn test_each_render_starts_from_clean_state() {
        let mut r = renderer(640, 480);
        r.canvas_mut().translate(5.0, 5.0);
        r.canvas_mut().save();
        r.render(&DetectionResult::new(vec![face(&[(0.5, 0.5)])]));
        assert_eq!(r.canvas().transform(), Transform::IDENTITY);
        assert!(r.canvas().stack.is_empty());
        assert_eq!(r.canvas().ops[0], Op::Clear);
    }

    #[test]
    fn test_face_without_landmarks_draws_nothing() {
        let mut r = renderer(640, 480);
        r.render(&DetectionResult::new(vec![Face::new(vec![])]));
        assert_eq!(r.canvas().ops, vec![Op::Clear]);
    }

    // ── Geometry ──

    #[test]
    fn test_single_face_scenario() {
        let mut r = renderer(640, 480);
        r.render(&DetectionResult::new(vec![face(&[(0.4, 0.3), (0.6, 0.7)])]));
        let ops = &r.canvas().ops;

        let circles: Vec<_> = ops.iter().filter(|op| matches!(op, Op::Circle { .. })).collect();
        assert_eq!(circles.len(), 2);
        // Mirrored: 0.4 * 640 = 256 → 640 - 256 = 384.
        let Op::Circle { at, shadow } = circles[0] else { unreachable!() };
        assert_relative_eq!(at.0, 384.0);
        assert_relative_eq!(at.1, 144.0);
        assert_eq!(shadow.unwrap().blur, 10.0);

        let Some(Op::Rect { x, y, w, h, t, shadow }) =
            ops.iter().find(|op| matches!(op, Op::Rect { .. }))
        else {
            panic!("no bounding box drawn");
        };
        assert_relative_eq!(*x, 0.35 * 640.0, epsilon = 1e-9);
        assert_relative_eq!(*y, 0.25 * 480.0, epsilon = 1e-9);
        assert_relative_eq!(*w, 0.3 * 640.0, epsilon = 1e-9);
        assert_relative_eq!(*h, 0.5 * 480.0, epsilon = 1e-9);
        assert!(t.is_mirrored());
        assert_eq!(shadow.unwrap().blur, 15.0);

        let corners = ops.iter().filter(|op| matches!(op, Op::Polyline { .. })).count();
        assert_eq!(corners, 4);
        assert_eq!(texts(ops).len(), 1);
    }

    #[test]
    fn test_box_clamps_to_canvas() {
        let mut r = renderer(100, 100);
        r.render(&DetectionResult::new(vec![face(&[(0.01, 0.02), (0.99, 1.02)])]));
        let Some(Op::Rect { x, y, w, h, .. }) =
            r.canvas().ops.iter().find(|op| matches!(op, Op::Rect { .. }))
        else {
            panic!("no bounding box drawn");
        };
        assert_eq!((*x, *y), (0.0, 0.0));
        assert_relative_eq!(*w, 100.0);
        assert_relative_eq!(*h, 100.0);
    }

    #[test]
    fn test_corner_paths_touch_box_corners() {
        let rect = PixelRect { x: 10.0, y: 20.0, width: 100.0, height: 50.0 };
        let corners = corner_paths(&rect, 20.0);
        assert_eq!(corners[0][1], (10.0, 20.0));
        assert_eq!(corners[1][1], (110.0, 20.0));
        assert_eq!(corners[2][1], (10.0, 70.0));
        assert_eq!(corners[3][1], (110.0, 70.0));
        assert_eq!(corners[3][2], (110.0, 50.0));
    }

    // ── Label ──

    #[test]
    fn test_label_reads_unmirrored_at_left_edge() {
        let mut r = renderer(640, 480);
        r.render(&DetectionResult::new(vec![face(&[(0.4, 0.3), (0.6, 0.7)])]));
        let ops = &r.canvas().ops;
        let Op::Text { text, x, y, t, shadow } = texts(ops)[0] else { unreachable!() };

        assert_eq!(text, "SCANNING ACTIVE");
        assert!(shadow.is_none());
        assert!(!t.is_mirrored());
        assert_relative_eq!(t.sx, 1.0);

        let (bx, bw) = (0.35 * 640.0, 0.3 * 640.0);
        assert_relative_eq!(*x, -bw, epsilon = 1e-9);
        assert_relative_eq!(*y, -10.0);
        let (sx, sy) = t.apply(*x, *y);
        assert_relative_eq!(sx, 640.0 - (bx + bw), epsilon = 1e-9);
        assert_relative_eq!(sy, 0.25 * 480.0 - 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_one_label_per_face() {
        let mut r = renderer(640, 480);
        r.render(&DetectionResult::new(vec![
            face(&[(0.1, 0.1), (0.2, 0.2)]),
            face(&[(0.6, 0.6), (0.8, 0.8)]),
        ]));
        assert_eq!(texts(&r.canvas().ops).len(), 2);
    }
}
