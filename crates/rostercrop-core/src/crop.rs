//! Padded face crops and annotated QA frames.

use crate::types::Rectangle;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use thiserror::Error;

/// Padding added on every side, as a fraction of the longer face side.
const PAD_FRACTION_DIVISOR: u32 = 5;
const CROP_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CROP_THICKNESS: u32 = 2;
const SELECTION_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CropError {
    #[error("face {rect:?} lies outside the {width}x{height} image")]
    OutOfBounds {
        rect: Rectangle,
        width: u32,
        height: u32,
    },
    #[error("face rectangle is empty")]
    EmptyRectangle,
}

/// Output of [`crop_face`].
#[derive(Debug, Clone)]
pub struct FaceCrop {
    /// Padded region actually cut out of the source.
    pub region: Rectangle,
    pub face: RgbImage,
    /// Full frame with the selection and crop boxes drawn, when requested.
    pub annotated: Option<RgbImage>,
}

/// Expand `rect` by `floor(0.2 * max(w, h))` on each side, clamped to the image.
pub fn padded_region(rect: &Rectangle, image_width: u32, image_height: u32) -> Rectangle {
    let pad = rect.width.max(rect.height) / PAD_FRACTION_DIVISOR;

    let x1 = rect.x.saturating_sub(pad);
    let y1 = rect.y.saturating_sub(pad);
    let x2 = rect.right().saturating_add(pad).min(image_width).max(x1);
    let y2 = rect.bottom().saturating_add(pad).min(image_height).max(y1);

    Rectangle::new(x1, y1, x2 - x1, y2 - y1)
}

/// Cut the padded face out of `image`, optionally with an annotated copy.
pub fn crop_face(image: &RgbImage, rect: &Rectangle, annotate: bool) -> Result<FaceCrop, CropError> {
    let (width, height) = image.dimensions();
    if rect.width == 0 || rect.height == 0 {
        return Err(CropError::EmptyRectangle);
    }
    if rect.right() > width || rect.bottom() > height {
        return Err(CropError::OutOfBounds {
            rect: *rect,
            width,
            height,
        });
    }

    let region = padded_region(rect, width, height);
    let face = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
    tracing::debug!(?rect, ?region, "cropped face");

    let annotated = annotate.then(|| annotate_frame(image, rect, &region));

    Ok(FaceCrop {
        region,
        face,
        annotated,
    })
}

fn annotate_frame(image: &RgbImage, selection: &Rectangle, region: &Rectangle) -> RgbImage {
    let mut frame = image.clone();

    // Thickness grows inward so the box stays inside the frame.
    for i in 0..CROP_THICKNESS {
        let inset = 2 * i;
        if region.width <= inset || region.height <= inset {
            break;
        }
        let rect = Rect::at((region.x + i) as i32, (region.y + i) as i32)
            .of_size(region.width - inset, region.height - inset);
        draw_hollow_rect_mut(&mut frame, rect, CROP_COLOR);
    }

    let rect = Rect::at(selection.x as i32, selection.y as i32).of_size(selection.width, selection.height);
    draw_hollow_rect_mut(&mut frame, rect, SELECTION_COLOR);

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_centered_face() {
        // pad = floor(0.2 * 100) = 20
        let region = padded_region(&Rectangle::new(200, 200, 100, 80), 1000, 1000);
        assert_eq!(region, Rectangle::new(180, 180, 140, 120));
    }

    #[test]
    fn test_padding_rounds_down() {
        // pad = floor(0.2 * 99) = 19
        let region = padded_region(&Rectangle::new(100, 100, 99, 50), 1000, 1000);
        assert_eq!(region, Rectangle::new(81, 81, 137, 88));
    }

    #[test]
    fn test_padding_clamps_to_bounds() {
        let cases = [
            (Rectangle::new(5, 5, 100, 100), 200, 200),
            (Rectangle::new(150, 150, 50, 50), 200, 200),
            (Rectangle::new(0, 0, 10, 10), 10, 10),
            (Rectangle::new(3, 7, 1, 1), 4, 8),
        ];
        for (rect, w, h) in cases {
            let r = padded_region(&rect, w, h);
            assert!(r.right() <= w && r.bottom() <= h, "{rect:?} -> {r:?}");
            assert!(r.x <= rect.x && r.y <= rect.y);
            assert!(r.right() >= rect.right() && r.bottom() >= rect.bottom());
        }
    }

    #[test]
    fn test_crop_face_dimensions() {
        let image = RgbImage::from_pixel(400, 300, Rgb([10, 20, 30]));
        let crop = crop_face(&image, &Rectangle::new(150, 100, 100, 100), false).unwrap();
        assert_eq!(crop.region, Rectangle::new(130, 80, 140, 140));
        assert_eq!(crop.face.dimensions(), (140, 140));
        assert!(crop.annotated.is_none());
    }

    #[test]
    fn test_crop_face_copies_pixels() {
        let mut image = RgbImage::new(100, 100);
        image.put_pixel(40, 40, Rgb([255, 0, 0]));
        let crop = crop_face(&image, &Rectangle::new(40, 40, 10, 10), false).unwrap();
        // pad = 2, so the source pixel (40, 40) lands at (2, 2).
        assert_eq!(crop.face.get_pixel(2, 2), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_crop_face_annotated_draws_boxes() {
        let image = RgbImage::new(400, 300);
        let crop = crop_face(&image, &Rectangle::new(150, 100, 100, 100), true).unwrap();
        let annotated = crop.annotated.unwrap();
        assert_eq!(annotated.dimensions(), (400, 300));
        assert_eq!(annotated.get_pixel(130, 80), &CROP_COLOR);
        assert_eq!(annotated.get_pixel(131, 81), &CROP_COLOR);
        assert_eq!(annotated.get_pixel(150, 100), &SELECTION_COLOR);
        assert_eq!(annotated.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_crop_face_rejects_bad_rectangles() {
        let image = RgbImage::new(100, 100);
        assert_eq!(
            crop_face(&image, &Rectangle::new(10, 10, 0, 5), false).unwrap_err(),
            CropError::EmptyRectangle
        );
        assert!(matches!(
            crop_face(&image, &Rectangle::new(90, 10, 20, 20), false),
            Err(CropError::OutOfBounds { .. })
        ));
    }
}
