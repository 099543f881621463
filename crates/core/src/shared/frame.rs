use std::time::Duration;

use ndarray::ArrayView3;

/// A single decoded video frame: contiguous RGB bytes in row-major order.
///
/// `position` is the presentation time reported by the source. It never
/// decreases within one source and is only used to tell new frames apart
/// from ones already processed.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    position: Duration,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, position: Duration) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            position,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    /// True once the frame carries drawable pixels.
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
