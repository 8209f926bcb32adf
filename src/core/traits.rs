//! Interfaces between the page processor and the models it drives.
//!
//! The page processor only sees these traits, so the ONNX models and the test
//! doubles used in integration tests are interchangeable.

use crate::core::errors::OCRError;
use crate::processors::BoundingBox;
use image::RgbImage;

/// Detector estimate of how long a text line is, used to pick the first
/// recognizer tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LengthHint {
    /// Fits the smallest recognizer.
    Short,
    /// Fits the middle recognizer.
    Medium,
    /// Needs the largest recognizer.
    Long,
}

impl LengthHint {
    /// Index of the tier a line with this hint starts at.
    pub fn start_tier(self) -> usize {
        match self {
            Self::Short => 0,
            Self::Medium => 1,
            Self::Long => 2,
        }
    }
}

/// One region found by the layout detector, in page pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDetection {
    /// Corners in detector order: top-left, bottom-left, top-right, bottom-right.
    pub bounding_box: BoundingBox,
    /// Class name from the detector class map.
    pub label: String,
    /// Detection score in `[0, 1]`.
    pub score: f32,
    /// Whether the class is a text line (and therefore recognized).
    pub is_text_line: bool,
    /// Optional line-length estimate.
    pub length_hint: Option<LengthHint>,
}

/// Output of one recognizer call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recognition {
    /// Decoded text.
    pub text: String,
    /// Mean per-character probability, when the model provides one.
    pub confidence: Option<f32>,
}

impl Recognition {
    /// Number of characters (not bytes) in the decoded text.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Finds layout regions on a page image.
pub trait LayoutDetector: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Detects regions on `image`.
    fn detect(&self, image: &RgbImage) -> Result<Vec<LayoutDetection>, OCRError>;
}

/// Reads the text of one cropped line image.
pub trait TextRecognizer: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Maximum number of characters this recognizer can emit.
    fn capacity(&self) -> usize;

    /// Recognizes a single line. Vertical lines arrive already rotated upright.
    fn recognize(&self, line: &RgbImage) -> Result<Recognition, OCRError>;
}

impl std::fmt::Debug for dyn LayoutDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LayoutDetector({})", self.name())
    }
}

impl std::fmt::Debug for dyn TextRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TextRecognizer({}, capacity {})", self.name(), self.capacity())
    }
}
