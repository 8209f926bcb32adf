//! PARSeq Text Recognition Model
//!
//! Reads one horizontal text line. The input is a `[1, 3, 16, W]` tensor
//! scaled to `[-1, 1]`; the output is `[1, T, C]` logits over the
//! character set with index 0 reserved for end-of-sequence. Character `i`
//! of the set is class `i + 1`.

use crate::core::errors::OCRError;
use crate::core::inference::OrtInfer;
use crate::core::traits::{Recognition, TextRecognizer};
use crate::core::{OrtSessionConfig, Tensor4D};
use crate::processors::NormalizeImage;
use image::{RgbImage, imageops::FilterType};
use ort::value::TensorRef;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Characters a recognizer can emit, in class order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charset {
    chars: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CharsetField {
    Text(String),
    List(Vec<String>),
}

#[derive(Deserialize)]
struct CharsetModel {
    charset_train: CharsetField,
}

#[derive(Deserialize)]
struct CharsetFile {
    model: CharsetModel,
}

impl Charset {
    /// Builds a charset from an ordered list of characters.
    pub fn new(chars: Vec<String>) -> Result<Self, OCRError> {
        if chars.is_empty() {
            return Err(OCRError::config_error_detailed(
                "charset",
                "character set is empty",
            ));
        }
        Ok(Self { chars })
    }

    /// Parses `model.charset_train`, either one string or a list of strings.
    pub fn from_yaml_str(content: &str) -> Result<Self, OCRError> {
        let file: CharsetFile = serde_yaml::from_str(content).map_err(|e| {
            OCRError::config_error_detailed("charset", format!("invalid YAML: {e}"))
        })?;
        let chars = match file.model.charset_train {
            CharsetField::Text(text) => text.chars().map(String::from).collect(),
            CharsetField::List(list) => list,
        };
        Self::new(chars)
    }

    /// Loads a charset file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OCRError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OCRError::model_load_error(path, "cannot read character set", None, Some(e))
        })?;
        Self::from_yaml_str(&content).map_err(|e| {
            OCRError::model_load_error(path, "invalid character set", None, Some(e))
        })
    }

    /// Number of characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Character for model class `class`, or `None` for end-of-sequence and
    /// out-of-range classes.
    pub fn char_for_class(&self, class: usize) -> Option<&str> {
        class
            .checked_sub(1)
            .and_then(|i| self.chars.get(i))
            .map(String::as_str)
    }
}

/// Greedy decoding of `[T, C]` logits.
///
/// Stops at the first end-of-sequence step or after `max_chars` characters.
/// The confidence is the mean softmax probability of the emitted characters.
pub fn decode_greedy(
    logits: &[f32],
    steps: usize,
    classes: usize,
    charset: &Charset,
    max_chars: usize,
) -> Recognition {
    let mut text = String::new();
    let mut prob_sum = 0.0f32;
    let mut emitted = 0usize;

    for step in logits.chunks_exact(classes).take(steps) {
        let Some((best, &best_logit)) = step
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
        else {
            break;
        };
        let Some(ch) = charset.char_for_class(best) else {
            break;
        };
        if emitted == max_chars {
            break;
        }
        let denom: f32 = step.iter().map(|&v| (v - best_logit).exp()).sum();
        prob_sum += 1.0 / denom;
        emitted += 1;
        text.push_str(ch);
    }

    let confidence = (emitted > 0).then(|| prob_sum / emitted as f32);
    Recognition { text, confidence }
}

/// Preprocessing configuration for a PARSeq model.
#[derive(Debug, Clone)]
pub struct ParseqPreprocessConfig {
    /// Input height.
    pub height: u32,
    /// Input width.
    pub width: u32,
}

/// PARSeq recognition model.
#[derive(Debug)]
pub struct ParseqModel {
    inference: OrtInfer,
    normalizer: NormalizeImage,
    charset: Arc<Charset>,
    preprocess_config: ParseqPreprocessConfig,
    capacity: usize,
}

impl ParseqModel {
    /// Creates a new PARSeq model.
    pub fn new(
        inference: OrtInfer,
        charset: Arc<Charset>,
        preprocess_config: ParseqPreprocessConfig,
        capacity: usize,
    ) -> Self {
        Self {
            inference,
            normalizer: NormalizeImage::symmetric(),
            charset,
            preprocess_config,
            capacity,
        }
    }

    /// Resizes a line to the fixed input size and normalizes it.
    pub fn preprocess(&self, line: &RgbImage) -> Result<Tensor4D, OCRError> {
        if line.width() == 0 || line.height() == 0 {
            return Err(OCRError::image_processing_error("text line crop is empty"));
        }
        let resized = image::imageops::resize(
            line,
            self.preprocess_config.width,
            self.preprocess_config.height,
            FilterType::Triangle,
        );
        self.normalizer.normalize_to(&resized)
    }

    /// Runs the model and decodes its logits.
    pub fn infer(&self, tensor: &Tensor4D) -> Result<Recognition, OCRError> {
        let model_name = self.inference.model_name().to_string();
        self.inference.with_session(|session| {
            let input_name = session
                .inputs
                .first()
                .map(|i| i.name.clone())
                .ok_or_else(|| OCRError::unexpected_output(&model_name, "model has no inputs"))?;
            let output_name = session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| OCRError::unexpected_output(&model_name, "model has no outputs"))?;

            let outputs = session
                .run(ort::inputs![
                    input_name.as_str() => TensorRef::from_array_view(tensor.view())?
                ])
                .map_err(|e| {
                    OCRError::inference_error(&model_name, "recognition forward pass", e)
                })?;

            let value = outputs.get(output_name.as_str()).ok_or_else(|| {
                OCRError::unexpected_output(&model_name, format!("missing output '{output_name}'"))
            })?;
            let (shape, logits) = value.try_extract_tensor::<f32>().map_err(|e| {
                OCRError::inference_error(&model_name, "extracting recognition logits", e)
            })?;
            if shape.len() != 3 || shape[0] != 1 {
                return Err(OCRError::unexpected_output(
                    &model_name,
                    format!("expected logits of shape [1, T, C], got {:?}", &shape[..]),
                ));
            }
            let steps = shape[1].max(0) as usize;
            let classes = shape[2].max(0) as usize;
            if classes == 0 || classes > self.charset.len() + 1 {
                return Err(OCRError::unexpected_output(
                    &model_name,
                    format!(
                        "model emits {} classes but the character set has {}",
                        classes,
                        self.charset.len()
                    ),
                ));
            }

            Ok(decode_greedy(
                logits,
                steps,
                classes,
                &self.charset,
                self.capacity,
            ))
        })
    }
}

impl TextRecognizer for ParseqModel {
    fn name(&self) -> &str {
        self.inference.model_name()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn recognize(&self, line: &RgbImage) -> Result<Recognition, OCRError> {
        let tensor = self.preprocess(line)?;
        self.infer(&tensor)
    }
}

/// Builder for PARSeq models.
#[derive(Debug, Default)]
pub struct ParseqModelBuilder {
    capacity: Option<usize>,
    height: Option<u32>,
    width: Option<u32>,
    session_config: Option<OrtSessionConfig>,
}

impl ParseqModelBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the character capacity. The input width defaults from it.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Overrides the input size.
    pub fn image_shape(mut self, height: u32, width: u32) -> Self {
        self.height = Some(height);
        self.width = Some(width);
        self
    }

    /// Sets the ONNX Runtime session configuration.
    pub fn session_config(mut self, config: OrtSessionConfig) -> Self {
        self.session_config = Some(config);
        self
    }

    /// Input width of the deployed models for a given capacity.
    fn default_width(capacity: usize) -> u32 {
        match capacity {
            0..=30 => 256,
            31..=50 => 384,
            _ => 768,
        }
    }

    /// Loads the model.
    pub fn build(
        self,
        model_path: impl AsRef<Path>,
        charset: Arc<Charset>,
    ) -> Result<ParseqModel, OCRError> {
        let capacity = self.capacity.ok_or_else(|| {
            OCRError::config_error_detailed("text recognizer", "capacity is required")
        })?;
        if capacity == 0 {
            return Err(OCRError::config_error_detailed(
                "text recognizer",
                "capacity must be positive",
            ));
        }
        let preprocess_config = ParseqPreprocessConfig {
            height: self.height.unwrap_or(16),
            width: self.width.unwrap_or_else(|| Self::default_width(capacity)),
        };
        let inference =
            OrtInfer::from_config(&self.session_config.unwrap_or_default(), model_path)?;
        Ok(ParseqModel::new(
            inference,
            charset,
            preprocess_config,
            capacity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charset() -> Charset {
        Charset::from_yaml_str("model:\n  charset_train: \"abc\"\n").expect("charset")
    }

    fn one_hot(classes: usize, hot: usize) -> Vec<f32> {
        (0..classes)
            .map(|c| if c == hot { 10.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_charset_forms() {
        let set = charset();
        assert_eq!(set.len(), 3);
        assert_eq!(set.char_for_class(0), None);
        assert_eq!(set.char_for_class(1), Some("a"));
        assert_eq!(set.char_for_class(3), Some("c"));
        assert_eq!(set.char_for_class(4), None);

        let list = Charset::from_yaml_str("model:\n  charset_train: [\"あ\", \"い\"]\n")
            .expect("list charset");
        assert_eq!(list.char_for_class(2), Some("い"));

        assert!(Charset::from_yaml_str("model:\n  charset_train: \"\"\n").is_err());
        assert!(Charset::from_yaml_str("other: 1\n").is_err());
    }

    #[test]
    fn test_decode_stops_at_eos() {
        let set = charset();
        let mut logits = Vec::new();
        for hot in [3, 1, 2, 0, 1] {
            logits.extend(one_hot(4, hot));
        }
        let rec = decode_greedy(&logits, 5, 4, &set, 30);
        assert_eq!(rec.text, "cab");
        let confidence = rec.confidence.expect("confidence");
        assert!(confidence > 0.99 && confidence <= 1.0);
    }

    #[test]
    fn test_decode_respects_capacity() {
        let set = charset();
        let logits: Vec<f32> = (0..6).flat_map(|_| one_hot(4, 1)).collect();
        let rec = decode_greedy(&logits, 6, 4, &set, 4);
        assert_eq!(rec.text, "aaaa");
    }

    #[test]
    fn test_decode_empty() {
        let set = charset();
        let rec = decode_greedy(&one_hot(4, 0), 1, 4, &set, 30);
        assert_eq!(rec.text, "");
        assert_eq!(rec.confidence, None);
    }

    #[test]
    fn test_default_widths() {
        assert_eq!(ParseqModelBuilder::default_width(30), 256);
        assert_eq!(ParseqModelBuilder::default_width(50), 384);
        assert_eq!(ParseqModelBuilder::default_width(100), 768);
    }
}
