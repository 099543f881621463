use crate::shared::bounding_box::DEFAULT_BOX_PADDING;

use super::canvas::{Color, Shadow, Stroke, TextStyle};

pub const DEFAULT_ACCENT: Color = Color::rgb(0x00, 0xf2, 0xfe);
pub const DEFAULT_LABEL: &str = "SCANNING ACTIVE";

/// Visual constants of the HUD overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayStyle {
    pub accent: Color,
    pub landmark_radius: f64,
    pub landmark_glow_blur: f64,
    pub box_stroke_alpha: f64,
    pub box_stroke_width: f64,
    pub box_glow_blur: f64,
    pub box_glow_alpha: f64,
    pub corner_stroke_width: f64,
    pub corner_length: f64,
    pub label: String,
    pub label_size: f64,
    pub label_alpha: f64,
    /// Baseline offset of the label above the box top, in pixels.
    pub label_offset_y: f64,
    /// Fraction of the canvas added on each side of the landmark extent.
    pub box_padding: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            accent: DEFAULT_ACCENT,
            landmark_radius: 1.5,
            landmark_glow_blur: 10.0,
            box_stroke_alpha: 0.3,
            box_stroke_width: 1.0,
            box_glow_blur: 15.0,
            box_glow_alpha: 0.5,
            corner_stroke_width: 3.0,
            corner_length: 20.0,
            label: DEFAULT_LABEL.to_string(),
            label_size: 14.0,
            label_alpha: 0.9,
            label_offset_y: -10.0,
            box_padding: DEFAULT_BOX_PADDING,
        }
    }
}

impl OverlayStyle {
    pub fn landmark_shadow(&self) -> Shadow {
        Shadow {
            blur: self.landmark_glow_blur,
            color: self.accent,
        }
    }

    pub fn box_shadow(&self) -> Shadow {
        Shadow {
            blur: self.box_glow_blur,
            color: self.accent.with_alpha(self.box_glow_alpha),
        }
    }

    pub fn box_stroke(&self) -> Stroke {
        Stroke {
            color: self.accent.with_alpha(self.box_stroke_alpha),
            width: self.box_stroke_width,
        }
    }

    pub fn corner_stroke(&self) -> Stroke {
        Stroke {
            color: self.accent,
            width: self.corner_stroke_width,
        }
    }

    pub fn label_style(&self) -> TextStyle {
        TextStyle {
            color: self.accent.with_alpha(self.label_alpha),
            size: self.label_size,
        }
    }
}
