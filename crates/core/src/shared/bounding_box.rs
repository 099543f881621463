use crate::detection::domain::face_landmarks::Face;

/// Padding added on every side of a face box, as a fraction of the canvas.
pub const DEFAULT_BOX_PADDING: f64 = 0.05;

/// Extent of a face's landmarks in normalized coordinates.
///
/// Derived per frame and never stored.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Axis-aligned rectangle in canvas pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

impl BoundingBox {
    /// Tight box around every landmark. `None` for a face without landmarks.
    pub fn from_face(face: &Face) -> Option<Self> {
        let mut points = face.landmarks().iter();
        let first = points.next()?;
        let mut bbox = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for l in points {
            bbox.min_x = bbox.min_x.min(l.x);
            bbox.min_y = bbox.min_y.min(l.y);
            bbox.max_x = bbox.max_x.max(l.x);
            bbox.max_y = bbox.max_y.max(l.y);
        }
        Some(bbox)
    }

    /// Grows the box by `padding` on each side, then clamps to the unit square.
    pub fn padded(&self, padding: f64) -> Self {
        Self {
            min_x: (self.min_x - padding).clamp(0.0, 1.0),
            min_y: (self.min_y - padding).clamp(0.0, 1.0),
            max_x: (self.max_x + padding).clamp(0.0, 1.0),
            max_y: (self.max_y + padding).clamp(0.0, 1.0),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> PixelRect {
        let w = width as f64;
        let h = height as f64;
        PixelRect {
            x: self.min_x * w,
            y: self.min_y * h,
            width: (self.max_x - self.min_x).max(0.0) * w,
            height: (self.max_y - self.min_y).max(0.0) * h,
        }
    }
}
