//! Result types for the page pipeline, serialized in the response wire shape.

use crate::processors::BoundingBox;
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;

/// One detected region with its recognized text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    /// Position in the page reading order, starting at 0.
    pub id: usize,
    /// Region corners as emitted by the detector.
    pub bounding_box: BoundingBox,
    /// Detector class name.
    pub label: String,
    /// Recognized text; empty for layout blocks.
    pub text: String,
    /// Detection score in `[0, 1]`.
    pub confidence: f32,
    /// Whether this region is taller than wide.
    pub is_vertical: bool,
    /// Whether this region is a text line.
    pub is_text_line: bool,
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

impl Serialize for TextRegion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TextRegion", 6)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("text", &self.text)?;
        state.serialize_field("boundingBox", &self.bounding_box.to_int_corners())?;
        state.serialize_field("isVertical", flag(self.is_vertical))?;
        state.serialize_field("isTextline", flag(self.is_text_line))?;
        state.serialize_field("confidence", &self.confidence)?;
        state.end()
    }
}

/// Pixel size of a page raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    /// Width in pixels.
    pub img_width: u32,
    /// Height in pixels.
    pub img_height: u32,
}

/// OCR output for one page. Holds no filesystem path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    /// 1-based page number in the source document.
    pub page: u32,
    /// Text of all text lines in reading order, joined by `\n`.
    pub text: String,
    /// Raster size.
    #[serde(rename = "imginfo")]
    pub image_info: ImageInfo,
    /// Regions in reading order.
    pub contents: Vec<TextRegion>,
}

/// OCR output for a whole invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvocationResult {
    /// Pages in ascending page order.
    pub pages: Vec<PageResult>,
}

impl InvocationResult {
    /// Collects page results, ordering them by page number.
    pub fn from_pages(mut pages: Vec<PageResult>) -> Self {
        pages.sort_by_key(|p| p.page);
        Self { pages }
    }
}
