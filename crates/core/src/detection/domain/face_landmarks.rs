//! Normalized face-mesh landmarks as produced by a landmark detector.
//!
//! Coordinates are fractions of the frame's width and height. Landmark order
//! inside a [`Face`] is fixed by the model: the same index always names the
//! same facial point.

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    /// Relative depth. Not used for drawing.
    pub z: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_depth(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Face {
    landmarks: Vec<Landmark>,
}

impl Face {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// Faces found in one processed frame, possibly none.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub faces: Vec<Face>,
}

impl DetectionResult {
    pub fn new(faces: Vec<Face>) -> Self {
        Self { faces }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
