//! Bounding box based image cropping utilities.

use crate::core::OCRError;
use crate::processors::BoundingBox;
use image::{RgbImage, imageops};

/// Bounding box based image cropping utilities.
pub struct BBoxCrop;

impl BBoxCrop {
    /// Crops the axis-aligned hull of `bbox` out of `image`.
    ///
    /// Coordinates are clamped to the image. A region that is empty after
    /// clamping is an error.
    pub fn crop_bounding_box(image: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage, OCRError> {
        if bbox.points.is_empty() {
            return Err(OCRError::image_processing_error("Empty bounding box"));
        }

        let x1 = (bbox.x_min().max(0.0).floor() as u32).min(image.width());
        let y1 = (bbox.y_min().max(0.0).floor() as u32).min(image.height());
        let x2 = (bbox.x_max().max(0.0).ceil() as u32).min(image.width());
        let y2 = (bbox.y_max().max(0.0).ceil() as u32).min(image.height());

        if x2 <= x1 || y2 <= y1 {
            return Err(OCRError::image_processing_error(format!(
                "Invalid crop region: ({x1}, {y1}) to ({x2}, {y2})"
            )));
        }

        Ok(imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image())
    }

    /// Crops a text line and turns vertical lines upright for recognition.
    ///
    /// A crop taller than wide is rotated 90 degrees counter-clockwise, so the
    /// first character of a top-to-bottom line ends up on the left.
    pub fn crop_text_line(image: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage, OCRError> {
        let crop = Self::crop_bounding_box(image, bbox)?;
        if crop.height() > crop.width() {
            Ok(imageops::rotate270(&crop))
        } else {
            Ok(crop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::Point;
    use image::{ImageBuffer, Rgb};

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, 128])
        })
    }

    #[test]
    fn test_crop_bounding_box_valid_rectangle() {
        let img = create_test_image(100, 100);
        let bbox = BoundingBox::from_coords(10.0, 10.0, 50.0, 40.0);

        let cropped = BBoxCrop::crop_bounding_box(&img, &bbox).expect("crop");
        assert_eq!(cropped.dimensions(), (40, 30));
        assert_eq!(cropped.get_pixel(0, 0), img.get_pixel(10, 10));
    }

    #[test]
    fn test_crop_bounding_box_empty_points() {
        let img = create_test_image(100, 100);
        let bbox = BoundingBox { points: vec![] };

        let err = BBoxCrop::crop_bounding_box(&img, &bbox).expect_err("empty box");
        assert!(err.to_string().contains("Empty bounding box"));
    }

    #[test]
    fn test_crop_bounding_box_single_point() {
        let img = create_test_image(100, 100);
        let bbox = BoundingBox {
            points: vec![Point { x: 50.0, y: 50.0 }],
        };

        let err = BBoxCrop::crop_bounding_box(&img, &bbox).expect_err("degenerate box");
        assert!(err.to_string().contains("Invalid crop region"));
    }

    #[test]
    fn test_crop_bounding_box_clamps_to_image() {
        let img = create_test_image(100, 100);
        let bbox = BoundingBox::from_coords(-10.0, -5.0, 130.0, 25.0);

        let cropped = BBoxCrop::crop_bounding_box(&img, &bbox).expect("crop");
        assert_eq!(cropped.dimensions(), (100, 25));
    }

    #[test]
    fn test_crop_text_line_rotates_vertical_lines() {
        let img = create_test_image(100, 200);
        let vertical = BoundingBox::from_coords(10.0, 10.0, 30.0, 110.0);
        let horizontal = BoundingBox::from_coords(10.0, 10.0, 90.0, 30.0);

        let rotated = BBoxCrop::crop_text_line(&img, &vertical).expect("crop");
        assert_eq!(rotated.dimensions(), (100, 20));
        // The top-left pixel of a counter-clockwise rotation is the source top-right.
        assert_eq!(rotated.get_pixel(0, 0), img.get_pixel(29, 10));

        let upright = BBoxCrop::crop_text_line(&img, &horizontal).expect("crop");
        assert_eq!(upright.dimensions(), (80, 20));
    }
}
