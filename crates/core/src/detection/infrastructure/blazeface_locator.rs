//! First stage of the landmark engine: locate faces with BlazeFace.
//!
//! Produces normalized face boxes that the face-mesh stage crops around.
use std::path::Path;

use crate::shared::frame::Frame;

use super::execution_provider::{execution_providers_for, Accelerator};

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// A located face in normalized frame coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceCandidate {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub score: f64,
}

pub struct BlazefaceLocator {
    session: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl BlazefaceLocator {
    pub fn new(
        model_path: &Path,
        accelerator: Accelerator,
        confidence: f64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = build_session(model_path, accelerator)?;
        Ok(Self {
            session,
            confidence,
            anchors: generate_anchors(),
        })
    }

    /// Returns candidates sorted by descending score, at most `max_faces`.
    pub fn locate(
        &mut self,
        frame: &Frame,
        max_faces: usize,
    ) -> Result<Vec<FaceCandidate>, Box<dyn std::error::Error>> {
        let input_tensor = resize_to_tensor(frame, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // regressors: [1, 896, 16], classificators: [1, 896, 1]
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }
        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        let mut candidates = decode(reg_data, score_data, &self.anchors, self.confidence);
        let mut kept = nms(&mut candidates, NMS_IOU_THRESH);
        kept.truncate(max_faces);
        Ok(kept)
    }
}

pub(crate) fn build_session(
    model_path: &Path,
    accelerator: Accelerator,
) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    if !model_path.is_file() {
        return Err(format!("model not found: {}", model_path.display()).into());
    }
    let providers = execution_providers_for(accelerator);
    let builder = ort::session::Session::builder()?;
    let builder = if providers.is_empty() {
        builder
    } else {
        builder.with_execution_providers(providers)?
    };
    Ok(builder.commit_from_file(model_path)?)
}

fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f64,
) -> Vec<FaceCandidate> {
    let mut out = Vec::new();
    let num_anchors = anchors.len().min(NUM_ANCHORS);
    let size = INPUT_SIZE as f32;

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if (score as f64) < confidence {
            continue;
        }
        let offset = i * 16;
        if offset + 4 > reg_data.len() {
            break;
        }
        let anchor = anchors[i];
        out.push(FaceCandidate {
            center_x: (anchor[0] + reg_data[offset] / size) as f64,
            center_y: (anchor[1] + reg_data[offset + 1] / size) as f64,
            width: (reg_data[offset + 2] / size) as f64,
            height: (reg_data[offset + 3] / size) as f64,
            score: score as f64,
        });
    }
    out
}

/// Resize the whole frame to `size × size`, normalized to [0,1], NCHW.
pub(crate) fn resize_to_tensor(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));
    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// Short-range anchors: 16×16 grid with 2 per cell, 8×8 grid with 6 per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }
    anchors
}

fn nms(candidates: &mut [FaceCandidate], iou_thresh: f64) -> Vec<FaceCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceCandidate> = Vec::new();
    for c in candidates.iter() {
        if keep.iter().all(|k| iou(k, c) <= iou_thresh) {
            keep.push(c.clone());
        }
    }
    keep
}

fn iou(a: &FaceCandidate, b: &FaceCandidate) -> f64 {
    let (ax1, ay1) = (a.center_x - a.width / 2.0, a.center_y - a.height / 2.0);
    let (bx1, by1) = (b.center_x - b.width / 2.0, b.center_y - b.height / 2.0);
    let x1 = ax1.max(bx1);
    let y1 = ay1.max(by1);
    let x2 = (ax1 + a.width).min(bx1 + b.width);
    let y2 = (ay1 + a.height).min(by1 + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    inter / (a.width * a.height + b.width * b.height - inter)
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn candidate(cx: f64, cy: f64, size: f64, score: f64) -> FaceCandidate {
        FaceCandidate {
            center_x: cx,
            center_y: cy,
            width: size,
            height: size,
            score,
        }
    }

    #[test]
    fn test_resize_to_tensor_shape_and_range() {
        let frame = Frame::new(vec![255u8; 200 * 100 * 3], 200, 100, 3, Duration::ZERO);
        let tensor = resize_to_tensor(&frame, INPUT_SIZE);
        assert_eq!(tensor.shape(), &[1, 3, 128, 128]);
        assert!((tensor[[0, 2, 127, 127]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_generate_anchors_count_and_range() {
        let anchors = generate_anchors();
        // 16×16 × 2 + 8×8 × 6 = 512 + 384
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert!(anchors.iter().all(|a| a[0] > 0.0 && a[0] < 1.0));
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let anchors = vec![[0.5, 0.5], [0.25, 0.25]];
        let mut regs = vec![0.0f32; 32];
        regs[2] = 64.0; // width 0.5 for anchor 0
        regs[3] = 64.0;
        let scores = [5.0f32, -5.0];
        let out = decode(&regs, &scores, &anchors, 0.5);
        assert_eq!(out.len(), 1);
        assert!((out[0].center_x - 0.5).abs() < 1e-6);
        assert!((out[0].width - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlap_keeps_best() {
        let mut cs = vec![
            candidate(0.5, 0.5, 0.2, 0.7),
            candidate(0.51, 0.5, 0.2, 0.9),
            candidate(0.1, 0.1, 0.1, 0.8),
        ];
        let kept = nms(&mut cs, NMS_IOU_THRESH);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-9);
        assert!((kept[1].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_sigmoid_midpoint() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }
}
