use crate::shared::frame::Frame;

use super::canvas::Canvas;

/// Shows a rendered overlay together with the frame it was computed from.
pub trait Presenter<C: Canvas>: Send {
    fn present(&mut self, frame: &Frame, canvas: &C) -> Result<(), Box<dyn std::error::Error>>;
}
