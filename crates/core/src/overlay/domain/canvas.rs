use super::transform::Transform;

/// Straight (non-premultiplied) RGBA colour with a float alpha.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `#rrggbb`. The leading `#` is optional.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// 8-bit RGBA with the alpha scaled to 0..=255.
    pub fn to_rgba8(&self) -> [u8; 4] {
        let a = (self.a.clamp(0.0, 1.0) * 255.0).round() as u8;
        [self.r, self.g, self.b, a]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f64,
}

/// Glow drawn behind subsequent draws, like `shadowBlur`/`shadowColor`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shadow {
    pub blur: f64,
    pub color: Color,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub color: Color,
    pub size: f64,
}

/// A 2D drawing surface with a save/restore state stack.
///
/// Coordinates passed to drawing calls are in the current local space and
/// go through the current [`Transform`]. `save` pushes both the transform
/// and the shadow; `restore` pops them.
pub trait Canvas {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Changes the pixel size. Clears the content and resets state.
    fn resize(&mut self, width: u32, height: u32);

    fn save(&mut self);
    fn restore(&mut self);

    /// Clears the state stack, the transform and the shadow.
    fn reset_transform(&mut self);

    fn translate(&mut self, dx: f64, dy: f64);
    fn scale(&mut self, sx: f64, sy: f64);
    fn transform(&self) -> Transform;

    fn set_shadow(&mut self, shadow: Option<Shadow>);

    /// Clears every pixel regardless of the transform.
    fn clear(&mut self);

    fn fill_circle(&mut self, x: f64, y: f64, radius: f64, color: Color);
    fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, stroke: Stroke);
    fn stroke_polyline(&mut self, points: &[(f64, f64)], stroke: Stroke);

    /// Draws `text` with its left baseline at `(x, y)`.
    fn fill_text(&mut self, text: &str, x: f64, y: f64, style: TextStyle);
}
