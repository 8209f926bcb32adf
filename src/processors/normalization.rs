//! Pixel normalization into NCHW `f32` tensors.

use crate::core::Tensor4D;
use crate::core::errors::OCRError;
use image::RgbImage;

/// Per-channel affine normalization: `value * alpha[c] + beta[c]`.
///
/// `alpha = scale / std` and `beta = -mean / std`, so the result equals
/// `(value * scale - mean) / std`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeImage {
    /// Scaling factors for each channel.
    pub alpha: [f32; 3],
    /// Offset values for each channel.
    pub beta: [f32; 3],
}

impl NormalizeImage {
    /// Creates a normalizer from a scale and per-channel mean and standard deviation.
    ///
    /// # Errors
    ///
    /// Returns an error if the scale or any standard deviation is not positive.
    pub fn new(scale: f32, mean: [f32; 3], std: [f32; 3]) -> Result<Self, OCRError> {
        if scale <= 0.0 {
            return Err(OCRError::config_error_detailed(
                "normalization",
                format!("scale must be positive, got {scale}"),
            ));
        }
        if let Some(bad) = std.iter().find(|s| **s <= 0.0) {
            return Err(OCRError::config_error_detailed(
                "normalization",
                format!("standard deviation must be positive, got {bad}"),
            ));
        }
        Ok(Self {
            alpha: std.map(|s| scale / s),
            beta: [0usize, 1, 2].map(|c| -mean[c] / std[c]),
        })
    }

    /// Maps `[0, 255]` onto `[0, 1]`.
    pub fn unit_range() -> Self {
        Self {
            alpha: [1.0 / 255.0; 3],
            beta: [0.0; 3],
        }
    }

    /// Maps `[0, 255]` onto `[-1, 1]`.
    pub fn symmetric() -> Self {
        Self {
            alpha: [2.0 / 255.0; 3],
            beta: [-1.0; 3],
        }
    }

    /// Normalizes one RGB image into a `[1, 3, H, W]` tensor.
    pub fn normalize_to(&self, img: &RgbImage) -> Result<Tensor4D, OCRError> {
        let (width, height) = img.dimensions();
        let (w, h) = (width as usize, height as usize);
        let plane = w * h;
        let mut data = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in img.enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..3 {
                data[c * plane + offset] = pixel[c] as f32 * self.alpha[c] + self.beta[c];
            }
        }

        Ok(Tensor4D::from_shape_vec((1, 3, h, w), data)?)
    }
}
