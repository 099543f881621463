//! Two-stage face-mesh landmark engine using ONNX Runtime via `ort`.
//!
//! BlazeFace locates faces on the full frame; each face is then cropped to a
//! square region and passed through the 192×192 face-mesh model, whose 468
//! landmarks are mapped back to normalized frame coordinates.
use std::path::PathBuf;

use crate::detection::domain::face_landmarks::{DetectionResult, Face, Landmark};
use crate::detection::domain::landmark_detector::{LandmarkDetector, LandmarkDetectorFactory};
use crate::shared::frame::Frame;

use super::blazeface_locator::{build_session, sigmoid, BlazefaceLocator, FaceCandidate};
use super::execution_provider::Accelerator;

/// Face-mesh model input resolution.
const MESH_INPUT_SIZE: u32 = 192;

/// Landmarks per face produced by the mesh model.
pub const NUM_MESH_LANDMARKS: usize = 468;

/// The detector box covers the inner face; the mesh expects forehead and chin.
const ROI_SCALE: f64 = 1.5;

/// Minimum face-presence score from the mesh model.
const MIN_PRESENCE: f32 = 0.5;

pub const DEFAULT_MAX_FACES: usize = 1;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct FaceMeshConfig {
    pub detector_model: PathBuf,
    pub landmark_model: PathBuf,
    pub accelerator: Accelerator,
    pub max_faces: usize,
    pub min_confidence: f64,
}

pub struct OnnxFaceMeshDetector {
    locator: Option<BlazefaceLocator>,
    mesh: Option<ort::session::Session>,
    max_faces: usize,
    last_timestamp: Option<u64>,
}

impl OnnxFaceMeshDetector {
    pub fn new(config: &FaceMeshConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if config.max_faces == 0 {
            return Err("max_faces must be >= 1".into());
        }
        let locator = BlazefaceLocator::new(
            &config.detector_model,
            config.accelerator,
            config.min_confidence,
        )?;
        let mesh = build_session(&config.landmark_model, config.accelerator)?;
        log::info!(
            "Landmark engine ready ({} acceleration, up to {} face(s))",
            config.accelerator,
            config.max_faces
        );
        Ok(Self {
            locator: Some(locator),
            mesh: Some(mesh),
            max_faces: config.max_faces,
            last_timestamp: None,
        })
    }

    fn landmarks_for(
        mesh: &mut ort::session::Session,
        frame: &Frame,
        candidate: &FaceCandidate,
    ) -> Result<Option<Face>, Box<dyn std::error::Error>> {
        let roi = SquareRoi::around(candidate, frame.width(), frame.height());
        let input = crop_to_tensor(frame, &roi, MESH_INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = mesh.run(ort::inputs![input_value])?;

        let mut points: Option<Vec<f32>> = None;
        let mut presence: Option<f32> = None;
        for i in 0..outputs.len() {
            let array = outputs[i].try_extract_array::<f32>()?;
            let data = array.as_slice().ok_or("Cannot get mesh output slice")?;
            if data.len() >= NUM_MESH_LANDMARKS * 3 && points.is_none() {
                points = Some(data.to_vec());
            } else if data.len() == 1 {
                presence = Some(sigmoid(data[0]));
            }
        }

        let points = points.ok_or("Face-mesh model produced no landmark tensor")?;
        if presence.is_some_and(|p| p < MIN_PRESENCE) {
            return Ok(None);
        }
        Ok(Some(roi.map_landmarks(&points, frame.width(), frame.height())))
    }
}

impl LandmarkDetector for OnnxFaceMeshDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: u64,
    ) -> Result<DetectionResult, Box<dyn std::error::Error>> {
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                return Err(format!(
                    "timestamps must strictly increase: got {timestamp_ms} after {last}"
                )
                .into());
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        let (Some(locator), Some(mesh)) = (self.locator.as_mut(), self.mesh.as_mut()) else {
            return Err("Landmark engine has been disposed".into());
        };

        let candidates = locator.locate(frame, self.max_faces)?;
        let mut faces = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            if let Some(face) = Self::landmarks_for(mesh, frame, candidate)? {
                faces.push(face);
            }
        }
        Ok(DetectionResult::new(faces))
    }

    fn dispose(&mut self) {
        let was_loaded = self.locator.take().is_some();
        self.mesh = None;
        if was_loaded {
            log::debug!("Landmark engine disposed");
        }
    }
}

/// Creates [`OnnxFaceMeshDetector`]s from a fixed configuration.
pub struct OnnxFaceMeshDetectorFactory {
    config: FaceMeshConfig,
}

impl OnnxFaceMeshDetectorFactory {
    pub fn new(config: FaceMeshConfig) -> Self {
        Self { config }
    }
}

impl LandmarkDetectorFactory for OnnxFaceMeshDetectorFactory {
    fn create(&self) -> Result<Box<dyn LandmarkDetector>, Box<dyn std::error::Error>> {
        Ok(Box::new(OnnxFaceMeshDetector::new(&self.config)?))
    }
}

/// Square crop in frame pixels. May extend past the frame edges.
#[derive(Clone, Debug, PartialEq)]
struct SquareRoi {
    x0: f64,
    y0: f64,
    side: f64,
}

impl SquareRoi {
    fn around(candidate: &FaceCandidate, frame_w: u32, frame_h: u32) -> Self {
        let fw = frame_w as f64;
        let fh = frame_h as f64;
        let side = (candidate.width * fw).max(candidate.height * fh) * ROI_SCALE;
        Self {
            x0: candidate.center_x * fw - side / 2.0,
            y0: candidate.center_y * fh - side / 2.0,
            side,
        }
    }

    /// Maps flat `[x, y, z, ...]` mesh output (input-pixel units) to a face.
    fn map_landmarks(&self, points: &[f32], frame_w: u32, frame_h: u32) -> Face {
        let fw = frame_w as f64;
        let fh = frame_h as f64;
        let unit = self.side / MESH_INPUT_SIZE as f64;
        let landmarks = points
            .chunks_exact(3)
            .take(NUM_MESH_LANDMARKS)
            .map(|p| {
                Landmark::with_depth(
                    (self.x0 + p[0] as f64 * unit) / fw,
                    (self.y0 + p[1] as f64 * unit) / fh,
                    p[2] as f64 * unit / fw,
                )
            })
            .collect();
        Face::new(landmarks)
    }
}

/// Nearest-neighbour crop of `roi` into a `size × size` NCHW tensor.
/// Samples outside the frame stay black.
fn crop_to_tensor(frame: &Frame, roi: &SquareRoi, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_w = frame.width() as i64;
    let src_h = frame.height() as i64;
    let s = size as usize;
    let step = roi.side / s as f64;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (roi.y0 + (y as f64 + 0.5) * step).floor() as i64;
        if src_y < 0 || src_y >= src_h {
            continue;
        }
        for x in 0..s {
            let src_x = (roi.x0 + (x as f64 + 0.5) * step).floor() as i64;
            if src_x < 0 || src_x >= src_w {
                continue;
            }
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y as usize, src_x as usize, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}
