//! Crop pass over a photo directory.

use anyhow::{Context, Result};
use rostercrop_core::resolver::{ANNOTATED_SUFFIX, FACE_SUFFIX};
use rostercrop_core::{crop_face, find_best_face, DetectionParams, Detector, EvaluatorConfig};
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

#[derive(Debug, Clone)]
pub struct CropOptions {
    pub evaluator: EvaluatorConfig,
    pub face_params: DetectionParams,
    /// Annotated frames are written here when set.
    pub annotated_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CropSummary {
    pub images: usize,
    pub faces: usize,
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Supported image files in `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Crop the best face out of every supported image in `photos_dir`.
///
/// Unreadable images and failed writes are reported and skipped. Detector
/// failures abort the run.
pub fn crop_directory(
    photos_dir: &Path,
    out_dir: &Path,
    face_detector: &mut dyn Detector,
    mut eye_detector: Option<&mut dyn Detector>,
    options: &CropOptions,
) -> Result<CropSummary> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    if let Some(dir) = &options.annotated_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut summary = CropSummary::default();
    for path in list_images(photos_dir)? {
        summary.images += 1;
        let eyes = eye_detector.as_deref_mut().map(|d| d as &mut dyn Detector);
        let faces = crop_image(&path, out_dir, face_detector, eyes, options)?;
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        println!("{name}: {faces} face(s)");
        summary.faces += faces;
    }

    Ok(summary)
}

/// Process one photo, returning the number of crops written (0 or 1).
pub fn crop_image(
    path: &Path,
    out_dir: &Path,
    face_detector: &mut dyn Detector,
    eye_detector: Option<&mut dyn Detector>,
    options: &CropOptions,
) -> Result<usize> {
    let photo = match image::open(path) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read image");
            println!("Warning: failed to read {}", path.display());
            return Ok(0);
        }
    };

    let gray = photo.to_luma8();
    let rgb = photo.to_rgb8();

    let best = find_best_face(&gray, face_detector, eye_detector, &options.face_params, &options.evaluator)
        .with_context(|| format!("detecting faces in {}", path.display()))?;
    let Some(best) = best else {
        tracing::info!(path = %path.display(), "no verifiable face");
        return Ok(0);
    };

    let crop = match crop_face(&rgb, &best.rectangle, options.annotated_dir.is_some()) {
        Ok(crop) => crop,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to crop face");
            println!("Warning: failed to crop {}: {e}", path.display());
            return Ok(0);
        }
    };

    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let face_path = out_dir.join(format!("{stem}{FACE_SUFFIX}"));
    if let Err(e) = crop.face.save(&face_path) {
        tracing::warn!(path = %face_path.display(), error = %e, "failed to write face crop");
        println!("Warning: failed to write {}: {e}", face_path.display());
        return Ok(0);
    }
    tracing::info!(path = %face_path.display(), score = best.quality_score, "saved face crop");

    if let (Some(dir), Some(annotated)) = (&options.annotated_dir, &crop.annotated) {
        let ann_path = dir.join(format!("{stem}{ANNOTATED_SUFFIX}"));
        if let Err(e) = annotated.save(&ann_path) {
            tracing::warn!(path = %ann_path.display(), error = %e, "failed to write annotated frame");
            println!("Warning: failed to write {}: {e}", ann_path.display());
        }
    }

    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb, RgbImage};
    use rostercrop_core::{DetectorError, Rectangle};

    struct Fixed(Vec<Rectangle>);

    impl Detector for Fixed {
        fn detect(&mut self, _: &GrayImage, _: &DetectionParams) -> Result<Vec<Rectangle>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn options(annotated_dir: Option<PathBuf>) -> CropOptions {
        CropOptions {
            evaluator: EvaluatorConfig::default(),
            face_params: DetectionParams::FACE,
            annotated_dir,
        }
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_image(Path::new("a/b.JPG")));
        assert!(is_supported_image(Path::new("b.tif")));
        assert!(!is_supported_image(Path::new("b.gif")));
        assert!(!is_supported_image(Path::new("README")));
    }

    #[test]
    fn test_crop_directory_writes_one_crop_per_face() {
        let photos = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(400, 400, Rgb([200, 180, 160]))
            .save(photos.path().join("ahmad-foo.png"))
            .unwrap();
        std::fs::write(photos.path().join("notes.txt"), "not an image").unwrap();

        let ann_dir = out.path().join("annotated");
        let mut faces = Fixed(vec![Rectangle::new(150, 150, 100, 100)]);
        let summary =
            crop_directory(photos.path(), out.path(), &mut faces, None, &options(Some(ann_dir.clone()))).unwrap();

        assert_eq!(summary, CropSummary { images: 1, faces: 1 });
        let crop = image::open(out.path().join("ahmad-foo_face.jpg")).unwrap();
        assert_eq!((crop.width(), crop.height()), (140, 140));
        assert!(ann_dir.join("ahmad-foo_ann.jpg").is_file());
    }

    #[test]
    fn test_unreadable_image_is_skipped() {
        let photos = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(photos.path().join("broken.jpg"), b"not really a jpeg").unwrap();

        let mut faces = Fixed(vec![Rectangle::new(150, 150, 100, 100)]);
        let summary = crop_directory(photos.path(), out.path(), &mut faces, None, &options(None)).unwrap();

        assert_eq!(summary, CropSummary { images: 1, faces: 0 });
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_no_face_writes_nothing() {
        let photos = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        RgbImage::new(300, 300).save(photos.path().join("empty.png")).unwrap();

        let mut faces = Fixed(vec![]);
        let summary = crop_directory(photos.path(), out.path(), &mut faces, None, &options(None)).unwrap();

        assert_eq!(summary, CropSummary { images: 1, faces: 0 });
        assert!(!out.path().join("empty_face.jpg").exists());
    }

    #[test]
    fn test_failed_write_does_not_stop_batch() {
        let photos = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png"] {
            RgbImage::from_pixel(400, 400, Rgb([200, 180, 160]))
                .save(photos.path().join(name))
                .unwrap();
        }
        // A directory where the first crop should go makes its write fail.
        std::fs::create_dir(out.path().join("a_face.jpg")).unwrap();

        let mut faces = Fixed(vec![Rectangle::new(150, 150, 100, 100)]);
        let summary = crop_directory(photos.path(), out.path(), &mut faces, None, &options(None)).unwrap();

        assert_eq!(summary, CropSummary { images: 2, faces: 1 });
        assert!(out.path().join("a_face.jpg").is_dir());
        assert!(out.path().join("b_face.jpg").is_file());
    }

    #[test]
    fn test_detector_failure_aborts_batch() {
        struct Failing;

        impl Detector for Failing {
            fn detect(&mut self, _: &GrayImage, _: &DetectionParams) -> Result<Vec<Rectangle>, DetectorError> {
                Err(DetectorError::InferenceFailed("session closed".into()))
            }
        }

        let photos = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        RgbImage::new(300, 300).save(photos.path().join("a.png")).unwrap();

        let result = crop_directory(photos.path(), out.path(), &mut Failing, None, &options(None));
        assert!(result.is_err());
    }
}
