use crate::detection::domain::face_landmarks::DetectionResult;
use crate::shared::frame::Frame;

/// Domain interface for streaming face-landmark inference.
///
/// `timestamp_ms` must strictly increase across calls on one detector.
/// Implementations may keep per-stream state, hence `&mut self`.
pub trait LandmarkDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<DetectionResult, Box<dyn std::error::Error>>;

    /// Releases engine resources. Default: nothing to release.
    fn dispose(&mut self) {}
}

/// Builds a detector once per lifecycle start.
///
/// Construction can be slow (model load, accelerator setup) and may fail.
pub trait LandmarkDetectorFactory: Send {
    fn create(&self) -> Result<Box<dyn LandmarkDetector>, Box<dyn std::error::Error>>;
}
