use std::time::Duration;

use thiserror::Error;

use crate::shared::constants::{IDEAL_CAPTURE_HEIGHT, IDEAL_CAPTURE_WIDTH};
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no capture device available: {0}")]
    DeviceUnavailable(String),
    #[error("camera produced no frame within {0:?}")]
    NoFrames(Duration),
    #[error("capture backend error: {0}")]
    Backend(String),
}

/// What the caller would like from the device. The size is a preference:
/// sources fall back to the device default when it is rejected.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraRequest {
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraRequest {
    fn default() -> Self {
        Self {
            ideal_width: IDEAL_CAPTURE_WIDTH,
            ideal_height: IDEAL_CAPTURE_HEIGHT,
        }
    }
}

/// A live frame source whose position advances on its own, independent of
/// how often it is read.
pub trait FrameSource: Send {
    /// Latest decoded frame, or `None` before the first one arrives.
    fn current_frame(&self) -> Option<Frame>;

    /// Blocks until a frame has been decoded or `timeout` elapses.
    fn wait_for_first_frame(&self, timeout: Duration) -> Result<(), CaptureError>;

    /// Stops every hardware track and releases the device. Idempotent.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

/// Acquires capture devices.
pub trait CameraProvider: Send {
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn FrameSource>, CaptureError>;
}
