//! Best-face selection.
//!
//! Raw detector rectangles are filtered by geometry, scored by size and eye
//! evidence, and reduced to a single winner per image.

use crate::detector::{DetectionParams, Detector, DetectorError};
use crate::types::{FaceCandidate, Rectangle};
use image::imageops;
use image::GrayImage;

const MIN_ASPECT_RATIO: f64 = 0.4;
const MAX_ASPECT_RATIO: f64 = 2.0;
/// Fraction of each image dimension treated as the edge band.
const EDGE_MARGIN: f64 = 0.02;
const EYE_BONUS: f64 = 2000.0;
const SMALL_FACE_SIDE: u32 = 80;
const SMALL_FACE_PENALTY: f64 = 1000.0;

/// Caller-facing knobs for face evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    /// Reject rectangles covering less than this fraction of the image.
    pub min_area_ratio: Option<f64>,
    /// Informational only: eyes never gate acceptance.
    pub verify_eyes: bool,
    /// Advisory only, see `verify_eyes`.
    pub min_eyes: u32,
    /// Sensitivity used when looking for eyes inside a candidate.
    pub eye_params: DetectionParams,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            min_area_ratio: None,
            verify_eyes: false,
            min_eyes: 1,
            eye_params: DetectionParams::EYE,
        }
    }
}

/// Why a rectangle was dropped before scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    TooSmall { area_ratio: f64 },
    BadAspect { aspect: f64 },
    NearEdge,
}

/// Apply the geometric filters in order, returning the first that fails.
pub fn check_geometry(
    rect: &Rectangle,
    image_width: u32,
    image_height: u32,
    min_area_ratio: Option<f64>,
) -> Result<(), Rejection> {
    let (img_w, img_h) = (image_width as f64, image_height as f64);

    if let Some(min_ratio) = min_area_ratio {
        let area_ratio = rect.area() as f64 / (img_w * img_h);
        if area_ratio < min_ratio {
            return Err(Rejection::TooSmall { area_ratio });
        }
    }

    let aspect = rect.width as f64 / rect.height as f64;
    if !(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect) {
        return Err(Rejection::BadAspect { aspect });
    }

    let near_edge = (rect.x as f64) < img_w * EDGE_MARGIN
        || (rect.y as f64) < img_h * EDGE_MARGIN
        || rect.right() as f64 > img_w * (1.0 - EDGE_MARGIN)
        || rect.bottom() as f64 > img_h * (1.0 - EDGE_MARGIN);
    if near_edge {
        return Err(Rejection::NearEdge);
    }

    Ok(())
}

/// Composite score: area, plus a bonus per eye, minus a penalty for small faces.
pub fn quality_score(rect: &Rectangle, eye_count: u32) -> f64 {
    let penalty = if rect.width < SMALL_FACE_SIDE || rect.height < SMALL_FACE_SIDE {
        SMALL_FACE_PENALTY
    } else {
        0.0
    };
    rect.area() as f64 + EYE_BONUS * eye_count as f64 - penalty
}

/// Pick the most plausible face among `raw` detector rectangles.
///
/// Returns `Ok(None)` when nothing survives filtering. Ties on score go to
/// the earliest rectangle in `raw`. Eye detector failures abort the image.
pub fn evaluate(
    gray: &GrayImage,
    raw: &[Rectangle],
    mut eye_detector: Option<&mut dyn Detector>,
    config: &EvaluatorConfig,
) -> Result<Option<FaceCandidate>, DetectorError> {
    let (img_w, img_h) = gray.dimensions();
    let mut best: Option<FaceCandidate> = None;

    for (i, rect) in raw.iter().enumerate() {
        if let Err(reason) = check_geometry(rect, img_w, img_h, config.min_area_ratio) {
            tracing::debug!(face = i + 1, ?rect, ?reason, "rejected face");
            continue;
        }

        let eye_count = match eye_detector.as_deref_mut() {
            Some(eyes) => {
                let face = imageops::crop_imm(gray, rect.x, rect.y, rect.width, rect.height).to_image();
                let found = eyes.detect(&face, &config.eye_params)?.len() as u32;
                if found == 0 {
                    tracing::debug!(face = i + 1, "no eyes detected (keeping anyway)");
                } else if config.verify_eyes && found < config.min_eyes {
                    tracing::debug!(face = i + 1, found, min_eyes = config.min_eyes, "fewer eyes than requested");
                }
                found
            }
            None => 0,
        };

        let candidate = FaceCandidate {
            rectangle: *rect,
            eye_count,
            quality_score: quality_score(rect, eye_count),
        };
        tracing::debug!(face = i + 1, ?rect, eye_count, score = candidate.quality_score, "scored face");

        if best.map_or(true, |b| candidate.quality_score > b.quality_score) {
            best = Some(candidate);
        }
    }

    Ok(best)
}

/// Run the face detector over a frame and evaluate its output.
pub fn find_best_face(
    gray: &GrayImage,
    face_detector: &mut dyn Detector,
    eye_detector: Option<&mut dyn Detector>,
    face_params: &DetectionParams,
    config: &EvaluatorConfig,
) -> Result<Option<FaceCandidate>, DetectorError> {
    let raw = face_detector.detect(gray, face_params)?;
    tracing::debug!(count = raw.len(), "potential faces");

    let best = evaluate(gray, &raw, eye_detector, config)?;
    if let Some(face) = &best {
        tracing::info!(
            rect = ?face.rectangle,
            eyes = face.eye_count,
            score = face.quality_score,
            "selected face"
        );
    }
    Ok(best)
}
