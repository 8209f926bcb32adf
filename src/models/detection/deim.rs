//! DEIM Layout Detection Model
//!
//! A DETR-style detector exported with two inputs:
//!
//! - `images`: `f32 [1, 3, S, S]`, RGB scaled to `[0, 1]`
//! - `orig_target_sizes`: `i64 [1, 2]`, the size boxes are scaled back to
//!
//! and three (optionally four) outputs: `labels [1, N]`, `boxes [1, N, 4]`
//! as `x1, y1, x2, y2`, `scores [1, N]` and `char_count [1, N]`.
//!
//! The page is letterboxed into the square input by padding on the right and
//! bottom, so boxes scaled to the padded square are already in page
//! coordinates.

use crate::core::errors::OCRError;
use crate::core::inference::OrtInfer;
use crate::core::traits::{LayoutDetection, LayoutDetector, LengthHint};
use crate::core::{OrtSessionConfig, Tensor4D};
use crate::processors::{BoundingBox, NormalizeImage};
use image::{RgbImage, imageops::FilterType};
use ndarray::Array2;
use ort::value::{DynValue, TensorRef};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Prefix marking text-line classes in the class map.
pub const TEXT_LINE_PREFIX: &str = "line_";

/// Preprocessing configuration for the DEIM model.
#[derive(Debug, Clone)]
pub struct DeimPreprocessConfig {
    /// Side of the square model input.
    pub input_size: u32,
    /// Value used for the letterbox padding.
    pub pad_value: u8,
}

impl Default for DeimPreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: 1024,
            pad_value: 0,
        }
    }
}

/// Postprocessing configuration for the DEIM model.
#[derive(Debug, Clone)]
pub struct DeimPostprocessConfig {
    /// Detections scoring below this are dropped.
    pub score_threshold: f32,
    /// Text lines scoring below this are dropped.
    pub conf_threshold: f32,
    /// IoU above which a lower-scoring detection of the same class is suppressed.
    pub iou_threshold: f32,
}

impl Default for DeimPostprocessConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.2,
            conf_threshold: 0.25,
            iou_threshold: 0.2,
        }
    }
}

/// Class index to class name, read from the `names` entry of the class map YAML.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassMap {
    names: BTreeMap<i64, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NamesField {
    Map(BTreeMap<i64, String>),
    List(Vec<String>),
}

#[derive(Deserialize)]
struct ClassMapFile {
    names: NamesField,
}

impl ClassMap {
    /// Parses a class map document. `names` may be a list or an index map.
    pub fn from_yaml_str(content: &str) -> Result<Self, OCRError> {
        let file: ClassMapFile = serde_yaml::from_str(content).map_err(|e| {
            OCRError::config_error_detailed("class map", format!("invalid YAML: {e}"))
        })?;
        let names = match file.names {
            NamesField::Map(map) => map,
            NamesField::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(idx, name)| (idx as i64, name))
                .collect(),
        };
        if names.is_empty() {
            return Err(OCRError::config_error_detailed(
                "class map",
                "`names` is empty",
            ));
        }
        Ok(Self { names })
    }

    /// Loads a class map file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OCRError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OCRError::model_load_error(path, "cannot read class map", None, Some(e))
        })?;
        Self::from_yaml_str(&content).map_err(|e| {
            OCRError::model_load_error(path, "invalid class map", None, Some(e))
        })
    }

    /// Name of class `index`, if known.
    pub fn name(&self, index: i64) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the map has no classes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether any class is a text line.
    pub fn has_text_lines(&self) -> bool {
        self.names.values().any(|name| Self::is_text_line(name))
    }

    /// Whether class `name` is a text line.
    pub fn is_text_line(name: &str) -> bool {
        name.starts_with(TEXT_LINE_PREFIX)
    }
}

/// Raw model outputs for one image, flattened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeimRawOutput {
    /// Class index per query.
    pub labels: Vec<i64>,
    /// `x1, y1, x2, y2` per query.
    pub boxes: Vec<[f32; 4]>,
    /// Score per query.
    pub scores: Vec<f32>,
    /// Character-count class per query, when the model exports it.
    pub char_count: Option<Vec<f32>>,
}

/// DEIM layout detection model.
#[derive(Debug)]
pub struct DeimModel {
    inference: OrtInfer,
    normalizer: NormalizeImage,
    class_map: ClassMap,
    preprocess_config: DeimPreprocessConfig,
    postprocess_config: DeimPostprocessConfig,
}

impl DeimModel {
    /// Creates a new DEIM model.
    pub fn new(
        inference: OrtInfer,
        class_map: ClassMap,
        preprocess_config: DeimPreprocessConfig,
        postprocess_config: DeimPostprocessConfig,
    ) -> Self {
        Self {
            inference,
            normalizer: NormalizeImage::unit_range(),
            class_map,
            preprocess_config,
            postprocess_config,
        }
    }

    /// Class map used to label detections.
    pub fn class_map(&self) -> &ClassMap {
        &self.class_map
    }

    /// Letterboxes and normalizes a page.
    ///
    /// Returns the input tensor and the side of the padded square in page pixels.
    pub fn preprocess(&self, image: &RgbImage) -> Result<(Tensor4D, u32), OCRError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OCRError::InvalidInput {
                message: "page image is empty".to_string(),
            });
        }
        let side = width.max(height);
        let target = self.preprocess_config.input_size;
        let scale = target as f32 / side as f32;
        let new_w = ((width as f32 * scale).round() as u32).clamp(1, target);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, target);

        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
        let pad = self.preprocess_config.pad_value;
        let mut canvas = RgbImage::from_pixel(target, target, image::Rgb([pad, pad, pad]));
        image::imageops::replace(&mut canvas, &resized, 0, 0);

        Ok((self.normalizer.normalize_to(&canvas)?, side))
    }

    /// Runs the model on a preprocessed tensor.
    pub fn infer(&self, tensor: &Tensor4D, side: u32) -> Result<DeimRawOutput, OCRError> {
        let sizes = Array2::<i64>::from_elem((1, 2), side as i64);
        let model_name = self.inference.model_name().to_string();

        self.inference.with_session(|session| {
            let outputs = session
                .run(ort::inputs![
                    "images" => TensorRef::from_array_view(tensor.view())?,
                    "orig_target_sizes" => TensorRef::from_array_view(sizes.view())?
                ])
                .map_err(|e| {
                    OCRError::inference_error(&model_name, "layout detection forward pass", e)
                })?;

            let labels = extract_i64(outputs.get("labels"), "labels", &model_name)?;
            let scores = extract_f32(outputs.get("scores"), "scores", &model_name)?;
            let flat_boxes = extract_f32(outputs.get("boxes"), "boxes", &model_name)?;
            let char_count = match outputs.get("char_count") {
                Some(value) => Some(extract_f32(Some(value), "char_count", &model_name)?),
                None => None,
            };

            if flat_boxes.len() != labels.len() * 4 || scores.len() != labels.len() {
                return Err(OCRError::unexpected_output(
                    &model_name,
                    format!(
                        "mismatched output lengths: labels={}, boxes={}, scores={}",
                        labels.len(),
                        flat_boxes.len(),
                        scores.len()
                    ),
                ));
            }
            let boxes = flat_boxes
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect();

            Ok(DeimRawOutput {
                labels,
                boxes,
                scores,
                char_count,
            })
        })
    }

    /// Turns raw outputs into labelled detections in page coordinates.
    pub fn postprocess(
        &self,
        raw: &DeimRawOutput,
        page_width: u32,
        page_height: u32,
    ) -> Vec<LayoutDetection> {
        postprocess_detections(
            raw,
            &self.class_map,
            &self.postprocess_config,
            page_width,
            page_height,
        )
    }
}

impl LayoutDetector for DeimModel {
    fn name(&self) -> &str {
        self.inference.model_name()
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<LayoutDetection>, OCRError> {
        let (tensor, side) = self.preprocess(image)?;
        let raw = self.infer(&tensor, side)?;
        Ok(self.postprocess(&raw, image.width(), image.height()))
    }
}

/// Score filter, class-wise NMS and the text-line confidence floor.
///
/// Detections come back sorted by descending score.
pub fn postprocess_detections(
    raw: &DeimRawOutput,
    class_map: &ClassMap,
    config: &DeimPostprocessConfig,
    page_width: u32,
    page_height: u32,
) -> Vec<LayoutDetection> {
    let mut candidates: Vec<(i64, LayoutDetection)> = Vec::new();
    for (i, (&label, coords)) in raw.labels.iter().zip(&raw.boxes).enumerate() {
        let score = raw.scores[i];
        if score.is_nan() || score < config.score_threshold {
            continue;
        }
        let Some(name) = class_map.name(label) else {
            tracing::debug!(label, "skipping detection with unknown class");
            continue;
        };
        let is_text_line = ClassMap::is_text_line(name);
        if is_text_line && score < config.conf_threshold {
            continue;
        }
        let [x1, y1, x2, y2] = *coords;
        let bounding_box = BoundingBox::from_coords(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
            .clamp_to(page_width, page_height);
        if bounding_box.width() < 1.0 || bounding_box.height() < 1.0 {
            continue;
        }
        let length_hint = raw
            .char_count
            .as_ref()
            .and_then(|counts| counts.get(i))
            .map(|&c| length_hint_from_class(c));

        candidates.push((
            label,
            LayoutDetection {
                bounding_box,
                label: name.to_string(),
                score: score.clamp(0.0, 1.0),
                is_text_line,
                length_hint,
            },
        ));
    }

    candidates.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));

    let mut kept: Vec<(i64, LayoutDetection)> = Vec::with_capacity(candidates.len());
    for (label, det) in candidates {
        let suppressed = kept.iter().any(|(kept_label, kept_det)| {
            *kept_label == label
                && kept_det.bounding_box.iou(&det.bounding_box) > config.iou_threshold
        });
        if !suppressed {
            kept.push((label, det));
        }
    }
    kept.into_iter().map(|(_, det)| det).collect()
}

/// The detector predicts a length class per line: 3 fits 30 characters,
/// 2 fits 50, anything else needs the largest recognizer.
fn length_hint_from_class(value: f32) -> LengthHint {
    match value.round() as i64 {
        3 => LengthHint::Short,
        2 => LengthHint::Medium,
        _ => LengthHint::Long,
    }
}

fn extract_f32(value: Option<&DynValue>, name: &str, model: &str) -> Result<Vec<f32>, OCRError> {
    let value = value.ok_or_else(|| {
        OCRError::unexpected_output(model, format!("missing output '{name}'"))
    })?;
    if let Ok((_, data)) = value.try_extract_tensor::<f32>() {
        return Ok(data.to_vec());
    }
    let (_, data) = value
        .try_extract_tensor::<i64>()
        .map_err(|e| OCRError::inference_error(model, format!("output '{name}'"), e))?;
    Ok(data.iter().map(|&v| v as f32).collect())
}

fn extract_i64(value: Option<&DynValue>, name: &str, model: &str) -> Result<Vec<i64>, OCRError> {
    let value = value.ok_or_else(|| {
        OCRError::unexpected_output(model, format!("missing output '{name}'"))
    })?;
    if let Ok((_, data)) = value.try_extract_tensor::<i64>() {
        return Ok(data.to_vec());
    }
    let (_, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| OCRError::inference_error(model, format!("output '{name}'"), e))?;
    Ok(data.iter().map(|&v| v.round() as i64).collect())
}

/// Builder for the DEIM model.
#[derive(Debug, Default)]
pub struct DeimModelBuilder {
    preprocess_config: Option<DeimPreprocessConfig>,
    postprocess_config: Option<DeimPostprocessConfig>,
    session_config: Option<OrtSessionConfig>,
}

impl DeimModelBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the square input size.
    pub fn input_size(mut self, size: u32) -> Self {
        let mut config = self.preprocess_config.unwrap_or_default();
        config.input_size = size;
        self.preprocess_config = Some(config);
        self
    }

    /// Sets the postprocessing thresholds.
    pub fn postprocess_config(mut self, config: DeimPostprocessConfig) -> Self {
        self.postprocess_config = Some(config);
        self
    }

    /// Sets the ONNX Runtime session configuration.
    pub fn session_config(mut self, config: OrtSessionConfig) -> Self {
        self.session_config = Some(config);
        self
    }

    /// Loads the model and its class map.
    pub fn build(
        self,
        model_path: impl AsRef<Path>,
        class_map_path: impl AsRef<Path>,
    ) -> Result<DeimModel, OCRError> {
        let class_map = ClassMap::from_file(class_map_path)?;
        if !class_map.has_text_lines() {
            return Err(OCRError::config_error_detailed(
                "class map",
                format!("no class name starts with '{TEXT_LINE_PREFIX}'"),
            ));
        }
        if self
            .preprocess_config
            .as_ref()
            .is_some_and(|c| c.input_size == 0)
        {
            return Err(OCRError::config_error_detailed(
                "layout detector",
                "input size must be positive",
            ));
        }
        let inference = OrtInfer::from_config(
            &self.session_config.unwrap_or_default(),
            model_path,
        )?;
        Ok(DeimModel::new(
            inference,
            class_map,
            self.preprocess_config.unwrap_or_default(),
            self.postprocess_config.unwrap_or_default(),
        ))
    }
}
