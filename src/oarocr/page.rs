//! Single-page OCR: detection, reading order, cascaded recognition and assembly.

use crate::core::errors::{OCRError, ProcessingStage, SimpleError};
use crate::core::traits::LayoutDetection;
use crate::oarocr::cache::ModelCache;
use crate::oarocr::cascade::{CascadeConfig, CascadeLine};
use crate::oarocr::result::{ImageInfo, PageResult, TextRegion};
use crate::processors::{ReadingFlow, reading_order};
use crate::utils::BBoxCrop;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

/// One page raster inside an invocation workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    /// Location of the PNG file.
    pub path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// 1-based page number in the source document.
    pub page_number: u32,
}

/// Page processing options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageProcessorConfig {
    /// Escalation settings for the recognizer cascade.
    #[serde(default)]
    pub cascade: CascadeConfig,
    /// Also report non-text layout blocks (with empty text).
    #[serde(default)]
    pub include_layout_blocks: bool,
}

/// Runs the OCR pipeline over one page.
#[derive(Debug, Clone, Default)]
pub struct PageProcessor {
    config: PageProcessorConfig,
}

impl PageProcessor {
    /// Creates a processor with the given options.
    pub fn new(config: PageProcessorConfig) -> Self {
        Self { config }
    }

    /// Options in use.
    pub fn config(&self) -> &PageProcessorConfig {
        &self.config
    }

    /// Processes one page. Any detection or recognition failure fails the page.
    pub fn process(&self, page: &RasterPage, cache: &ModelCache) -> Result<PageResult, OCRError> {
        let started = Instant::now();
        if !page.path.is_file() {
            return Err(OCRError::processing(
                ProcessingStage::Preprocessing,
                format!("page {} raster is missing", page.page_number),
                SimpleError::new("expected page image file not found"),
            ));
        }
        let image = image::open(&page.path)
            .map_err(|e| {
                OCRError::processing(
                    ProcessingStage::Preprocessing,
                    format!("page {} raster cannot be decoded", page.page_number),
                    e,
                )
            })?
            .to_rgb8();
        let (width, height) = image.dimensions();

        let detections = cache.detector().detect(&image).map_err(|e| {
            OCRError::processing(
                ProcessingStage::LayoutDetection,
                format!("detector '{}'", cache.detector().name()),
                e,
            )
        })?;

        let (lines, blocks): (Vec<LayoutDetection>, Vec<LayoutDetection>) =
            detections.into_iter().partition(|d| d.is_text_line);
        let flow = ReadingFlow::infer(lines.iter().map(|d| &d.bounding_box));
        let lines = in_reading_order(lines, flow);

        let cascade_lines = lines
            .iter()
            .map(|det| {
                let image = BBoxCrop::crop_text_line(&image, &det.bounding_box)?;
                let start_tier = det.length_hint.map(|h| h.start_tier()).unwrap_or(0);
                Ok(CascadeLine { image, start_tier })
            })
            .collect::<Result<Vec<_>, OCRError>>()?;
        let outcomes = cache
            .cascade()
            .recognize(&cascade_lines, &self.config.cascade)?;

        let mut contents: Vec<TextRegion> = lines
            .into_iter()
            .zip(outcomes)
            .enumerate()
            .map(|(id, (det, outcome))| TextRegion {
                id,
                is_vertical: det.bounding_box.is_vertical(),
                bounding_box: det.bounding_box,
                label: det.label,
                text: outcome.recognition.text,
                confidence: det.score.clamp(0.0, 1.0),
                is_text_line: true,
            })
            .collect();
        let text = contents.iter().map(|r| r.text.as_str()).join("\n");

        if self.config.include_layout_blocks {
            let offset = contents.len();
            contents.extend(in_reading_order(blocks, flow).into_iter().enumerate().map(
                |(i, det)| TextRegion {
                    id: offset + i,
                    is_vertical: det.bounding_box.is_vertical(),
                    bounding_box: det.bounding_box,
                    label: det.label,
                    text: String::new(),
                    confidence: det.score.clamp(0.0, 1.0),
                    is_text_line: false,
                },
            ));
        }

        debug!(
            page = page.page_number,
            regions = contents.len(),
            flow = ?flow,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page processed"
        );

        Ok(PageResult {
            page: page.page_number,
            text,
            image_info: ImageInfo {
                img_width: width,
                img_height: height,
            },
            contents,
        })
    }
}

fn in_reading_order(detections: Vec<LayoutDetection>, flow: ReadingFlow) -> Vec<LayoutDetection> {
    let boxes: Vec<_> = detections.iter().map(|d| d.bounding_box.clone()).collect();
    let order = reading_order(&boxes, flow);
    let mut slots: Vec<Option<LayoutDetection>> = detections.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}
