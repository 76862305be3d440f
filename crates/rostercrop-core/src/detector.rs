//! Detection capability and its SCRFD backend.
//!
//! The evaluator only needs something that turns a grayscale image into
//! rectangles. [`ScrfdDetector`] provides faces through ONNX Runtime and
//! [`ScrfdEyeDetector`] turns the SCRFD eye landmarks into eye rectangles.

use crate::types::Rectangle;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
/// Positional output layout: scores, then boxes, then keypoints, each per stride.
const SCRFD_POSITIONAL_OUTPUTS: [OutputSlot; 3] = [(0, 3, 6), (1, 4, 7), (2, 5, 8)];

/// Eye finding runs on tight face crops, so it accepts weaker detections.
const EYE_CONFIDENCE_THRESHOLD: f32 = 0.3;
/// Side of an eye box as a fraction of the face width.
const EYE_BOX_FRACTION: f32 = 0.2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; place det_10g.onnx in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Sensitivity controls handed to a detector.
///
/// The knobs follow the cascade-classifier vocabulary. Backends honor the
/// ones that make sense for them; SCRFD uses `min_size` only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub scale_factor: f32,
    pub min_neighbors: u32,
    /// Minimum side in pixels; 0 disables the check.
    pub min_size: u32,
}

impl DetectionParams {
    /// Strict settings for whole-frame face detection.
    pub const FACE: Self = Self {
        scale_factor: 1.05,
        min_neighbors: 8,
        min_size: 50,
    };

    /// Relaxed settings for eye detection inside a face.
    pub const EYE: Self = Self {
        scale_factor: 1.1,
        min_neighbors: 3,
        min_size: 0,
    };
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self::FACE
    }
}

/// Anything that proposes rectangles in a grayscale image.
///
/// Rectangles must lie inside the image. Output order is significant: the
/// evaluator breaks score ties by it.
pub trait Detector {
    fn detect(
        &mut self,
        gray: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<Rectangle>, DetectorError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(
        &mut self,
        gray: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<Rectangle>, DetectorError> {
        (**self).detect(gray, params)
    }
}

/// (score, bbox, kps) output indices for one stride.
type OutputSlot = (usize, usize, usize);

/// Raw SCRFD detection in frame coordinates.
#[derive(Debug, Clone)]
struct Detection {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth]
    landmarks: Option<[(f32, f32); 5]>,
}

impl Detection {
    fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Maps letterboxed tensor coordinates back to the source frame.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// SCRFD face detector.
pub struct ScrfdDetector {
    session: Session,
    outputs: [OutputSlot; 3],
    confidence_threshold: f32,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs 9 outputs (score/bbox/kps per stride), got {}",
                names.len()
            )));
        }

        let outputs = output_slots(&names);
        tracing::info!(path = %model_path.display(), ?outputs, "loaded SCRFD model");

        Ok(Self {
            session,
            outputs,
            confidence_threshold: SCRFD_CONFIDENCE_THRESHOLD,
        })
    }

    /// Override the minimum detection confidence.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Run the model, returning detections sorted by confidence.
    fn infer(&mut self, gray: &GrayImage) -> Result<Vec<Detection>, DetectorError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = preprocess(gray);
        let slots = self.outputs;
        let threshold = self.confidence_threshold;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        for (&(score_idx, bbox_idx, kps_idx), &stride) in slots.iter().zip(SCRFD_STRIDES.iter()) {
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(score_idx, "scores")?;
            let boxes = extract(bbox_idx, "boxes")?;
            let kps = extract(kps_idx, "kps")?;

            decode_stride(scores, boxes, kps, stride, &letterbox, threshold, &mut detections);
        }

        Ok(suppress_overlaps(detections))
    }
}

impl Detector for ScrfdDetector {
    fn detect(
        &mut self,
        gray: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<Rectangle>, DetectorError> {
        let min_side = params.min_size as f32;
        let faces = self
            .infer(gray)?
            .into_iter()
            .filter(|d| d.width() >= min_side && d.height() >= min_side)
            .filter_map(|d| {
                Rectangle::from_corners_clipped(d.x1, d.y1, d.x2, d.y2, gray.width(), gray.height())
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = faces.len(), "SCRFD faces");
        Ok(faces)
    }
}

/// Eye finder built on SCRFD landmarks.
///
/// Runs SCRFD on a face sub-image and reports a small square around each
/// eye landmark of the strongest detection that falls inside the sub-image.
pub struct ScrfdEyeDetector {
    inner: ScrfdDetector,
}

impl ScrfdEyeDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        let inner = ScrfdDetector::load(model_path)?.with_confidence_threshold(EYE_CONFIDENCE_THRESHOLD);
        Ok(Self { inner })
    }
}

impl Detector for ScrfdEyeDetector {
    fn detect(
        &mut self,
        gray: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<Rectangle>, DetectorError> {
        let detections = self.inner.infer(gray)?;
        let eyes = detections
            .first()
            .map(|best| eye_boxes(best, gray.width(), gray.height(), params.min_size))
            .unwrap_or_default();
        Ok(eyes)
    }
}

/// Square boxes around the eye landmarks of `det` that lie inside a
/// `width`×`height` image, clipped to it.
fn eye_boxes(det: &Detection, width: u32, height: u32, min_size: u32) -> Vec<Rectangle> {
    let Some(landmarks) = det.landmarks else {
        return Vec::new();
    };

    let side = (det.width() * EYE_BOX_FRACTION).max(min_size as f32).max(1.0);
    let half = side / 2.0;
    landmarks[..2]
        .iter()
        .filter(|&&(x, y)| x >= 0.0 && y >= 0.0 && x < width as f32 && y < height as f32)
        .filter_map(|&(x, y)| Rectangle::from_corners_clipped(x - half, y - half, x + half, y + half, width, height))
        .collect()
}

/// Locate outputs by their `score_8` / `bbox_8` / `kps_8` names, falling
/// back to the positional layout when the export uses numeric names.
fn output_slots(names: &[String]) -> [OutputSlot; 3] {
    let position = |kind: &str, stride: usize| {
        let target = format!("{kind}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<OutputSlot>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| {
            Some((
                position("score", stride)?,
                position("bbox", stride)?,
                position("kps", stride)?,
            ))
        })
        .collect();

    match named {
        Some(slots) => [slots[0], slots[1], slots[2]],
        None => {
            tracing::info!(?names, "SCRFD output names not recognized, using positional layout");
            SCRFD_POSITIONAL_OUTPUTS
        }
    }
}

/// Letterbox a grayscale frame into a normalized 1×3×640×640 tensor.
fn preprocess(gray: &GrayImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = (gray.width() as f32, gray.height() as f32);
    let size = SCRFD_INPUT_SIZE as f32;
    let scale = (size / width).min(size / height);

    let new_w = ((width * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let new_h = ((height * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let pad_x = (SCRFD_INPUT_SIZE as u32 - new_w) / 2;
    let pad_y = (SCRFD_INPUT_SIZE as u32 - new_h) / 2;

    let resized = imageops::resize(gray, new_w, new_h, FilterType::Triangle);

    // Padding uses the mean so it normalizes to zero; gray is replicated to RGB.
    let tensor = Array4::from_shape_fn((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE), |(_, _, y, x)| {
        let (x, y) = (x as u32, y as u32);
        let inside = x >= pad_x && x < pad_x + new_w && y >= pad_y && y < pad_y + new_h;
        let pixel = if inside {
            resized.get_pixel(x - pad_x, y - pad_y).0[0] as f32
        } else {
            SCRFD_MEAN
        };
        (pixel - SCRFD_MEAN) / SCRFD_STD
    });

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    (tensor, letterbox)
}

/// Decode the anchor-free outputs of one stride into frame-space detections.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
    out: &mut Vec<Detection>,
) {
    let cells = SCRFD_INPUT_SIZE / stride;
    let anchors = cells * cells * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    for (idx, &score) in scores.iter().enumerate().take(anchors) {
        if score <= threshold {
            continue;
        }
        let Some(offsets) = boxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let ax = ((cell % cells) * stride) as f32;
        let ay = ((cell / cells) * stride) as f32;

        let (x1, y1) = letterbox.unmap(ax - offsets[0] * step, ay - offsets[1] * step);
        let (x2, y2) = letterbox.unmap(ax + offsets[2] * step, ay + offsets[3] * step);

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|points| {
            std::array::from_fn(|i| letterbox.unmap(ax + points[2 * i] * step, ay + points[2 * i + 1] * step))
        });

        out.push(Detection {
            x1,
            y1,
            x2,
            y2,
            score,
            landmarks,
        });
    }
}

/// Greedy non-maximum suppression; result is sorted by confidence.
fn suppress_overlaps(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        if kept.iter().all(|k| iou(k, &det) <= SCRFD_NMS_THRESHOLD) {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width() * a.height() + b.width() * b.height() - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, score: f32) -> Detection {
        Detection {
            x1: x,
            y1: y,
            x2: x + w,
            y2: y + h,
            score,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = det(0.0, 0.0, 100.0, 100.0, 1.0);
        let b = det(200.0, 200.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = det(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = det(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_overlaps_keeps_strongest() {
        let result = suppress_overlaps(vec![
            det(5.0, 5.0, 100.0, 100.0, 0.8),
            det(200.0, 200.0, 50.0, 50.0, 0.7),
            det(0.0, 0.0, 100.0, 100.0, 0.9),
        ]);
        let scores: Vec<f32> = result.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn test_output_slots_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(output_slots(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_output_slots_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| (428 + i).to_string()).collect();
        assert_eq!(output_slots(&names), SCRFD_POSITIONAL_OUTPUTS);
    }

    #[test]
    fn test_preprocess_letterbox_roundtrip() {
        let gray = GrayImage::from_pixel(320, 240, image::Luma([127]));
        let (tensor, letterbox) = preprocess(&gray);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);

        // 320x240 scales by 2 into 640x480, padded 80 rows top and bottom.
        assert!((letterbox.scale - 2.0).abs() < 1e-6);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 80.0);

        let (x, y) = letterbox.unmap(100.0 * 2.0, 50.0 * 2.0 + 80.0);
        assert!((x - 100.0).abs() < 1e-3 && (y - 50.0).abs() < 1e-3);
        // Padding normalizes to zero.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_decode_stride_maps_box_through_letterbox() {
        let stride = 32;
        let cells = SCRFD_INPUT_SIZE / stride;
        let anchors = cells * cells * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0; anchors];
        let mut boxes = vec![0.0; anchors * 4];
        // Anchor 2 is cell 1: x = 32, y = 0.
        scores[2] = 0.9;
        boxes[8..12].copy_from_slice(&[0.5, 0.0, 1.0, 1.0]);

        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let mut out = Vec::new();
        decode_stride(&scores, &boxes, &[], stride, &letterbox, 0.5, &mut out);

        assert_eq!(out.len(), 1);
        let d = &out[0];
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (16.0, 0.0, 64.0, 32.0));
        assert!(d.landmarks.is_none());
    }

    fn face_with_eyes(left: (f32, f32), right: (f32, f32)) -> Detection {
        Detection {
            landmarks: Some([left, right, (50.0, 60.0), (40.0, 75.0), (60.0, 75.0)]),
            ..det(0.0, 0.0, 100.0, 100.0, 0.9)
        }
    }

    #[test]
    fn test_eye_boxes_both_eyes_inside() {
        let face = face_with_eyes((30.0, 40.0), (70.0, 40.0));
        // Side is 20% of the 100 px face width.
        assert_eq!(
            eye_boxes(&face, 100, 100, 0),
            vec![Rectangle::new(20, 30, 20, 20), Rectangle::new(60, 30, 20, 20)]
        );
    }

    #[test]
    fn test_eye_boxes_drop_landmark_outside_image() {
        let face = face_with_eyes((30.0, 40.0), (105.0, 40.0));
        assert_eq!(eye_boxes(&face, 100, 100, 0), vec![Rectangle::new(20, 30, 20, 20)]);
    }

    #[test]
    fn test_eye_boxes_clipped_at_border() {
        let face = face_with_eyes((5.0, 40.0), (95.0, 40.0));
        assert_eq!(
            eye_boxes(&face, 100, 100, 0),
            vec![Rectangle::new(0, 30, 15, 20), Rectangle::new(85, 30, 15, 20)]
        );
    }

    #[test]
    fn test_eye_boxes_honor_min_size() {
        let face = face_with_eyes((30.0, 40.0), (70.0, 40.0));
        let boxes = eye_boxes(&face, 100, 100, 30);
        assert_eq!(boxes[0], Rectangle::new(15, 25, 30, 30));
    }

    #[test]
    fn test_eye_boxes_without_landmarks_is_empty() {
        let face = det(0.0, 0.0, 100.0, 100.0, 0.9);
        assert!(eye_boxes(&face, 100, 100, 0).is_empty());
    }
}
