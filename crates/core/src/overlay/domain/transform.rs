/// Axis-aligned affine map: `p' = (sx * x + tx, sy * y + ty)`.
///
/// Only scale and translation are supported, so rectangles stay rectangles
/// and the horizontal mirror is a plain sign on `sx`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub sx: f64,
    pub sy: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        sx: 1.0,
        sy: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Translation applied in the current local space, like a 2D context's
    /// `translate`.
    pub fn then_translate(self, dx: f64, dy: f64) -> Self {
        Self {
            tx: self.tx + self.sx * dx,
            ty: self.ty + self.sy * dy,
            ..self
        }
    }

    /// Scale applied in the current local space.
    pub fn then_scale(self, sx: f64, sy: f64) -> Self {
        Self {
            sx: self.sx * sx,
            sy: self.sy * sy,
            ..self
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.sx * x + self.tx, self.sy * y + self.ty)
    }

    /// Uniform length scale, used for radii and stroke widths.
    pub fn length_scale(&self) -> f64 {
        ((self.sx.abs() + self.sy.abs()) / 2.0).max(f64::EPSILON)
    }

    pub fn is_mirrored(&self) -> bool {
        self.sx < 0.0
    }
}
