//! Core error types for the OCR pipeline.
//!
//! `OCRError` covers everything below the request boundary: model loading,
//! inference, tensor shaping, image decoding and file access. The request
//! handler maps these into its own invocation taxonomy.

use thiserror::Error;

/// Enum representing different stages of processing in the OCR pipeline.
///
/// Used to identify which stage of the pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred while preparing model input tensors.
    Preprocessing,
    /// Error occurred during layout detection.
    LayoutDetection,
    /// Error occurred during text recognition.
    TextRecognition,
    /// Error occurred while ordering detected regions.
    ReadingOrder,
    /// Error occurred during image processing operations (cropping, rotation).
    ImageProcessing,
    /// Error occurred while rasterizing a document page.
    Rasterization,
    /// Error occurred during post-processing.
    PostProcessing,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Preprocessing => write!(f, "preprocessing"),
            ProcessingStage::LayoutDetection => write!(f, "layout detection"),
            ProcessingStage::TextRecognition => write!(f, "text recognition"),
            ProcessingStage::ReadingOrder => write!(f, "reading order"),
            ProcessingStage::ImageProcessing => write!(f, "image processing"),
            ProcessingStage::Rasterization => write!(f, "rasterization"),
            ProcessingStage::PostProcessing => write!(f, "post-processing"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// A plain message error used as the `source` of wrapped errors that have no
/// underlying cause of their own.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SimpleError(String);

impl SimpleError {
    /// Creates a new simple error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Enum representing the errors that can occur in the OCR pipeline.
#[derive(Error, Debug)]
pub enum OCRError {
    /// Error occurred while loading or decoding an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The stage of processing where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error occurred during model inference.
    #[error("inference failed in model '{model_name}': {context}")]
    Inference {
        /// The name of the model where inference failed.
        model_name: String,
        /// Additional context about the inference error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    ConfigError {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error from the ONNX Runtime session.
    #[error(transparent)]
    Session(#[from] ort::Error),

    /// Error from tensor shape operations.
    #[error("tensor operation")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),

    /// Error loading a model or model resource file.
    #[error("model load failed for '{model_path}': {reason}{suggestion}")]
    ModelLoad {
        /// Path to the model that failed to load
        model_path: String,
        /// Short reason string
        reason: String,
        /// Optional suggestion (prefixed with '; ' when present)
        suggestion: String,
        /// Underlying source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<image::ImageError> for OCRError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}

impl OCRError {
    /// Wraps an error raised in a given processing stage.
    pub fn processing(
        kind: ProcessingStage,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates an image processing error from a message.
    pub fn image_processing_error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Processing {
            kind: ProcessingStage::ImageProcessing,
            context: message.clone(),
            source: Box::new(SimpleError::new(message)),
        }
    }

    /// Creates an inference error for the given model.
    pub fn inference_error(
        model_name: impl Into<String>,
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Inference {
            model_name: model_name.into(),
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Creates an error for a model output that does not have the expected form.
    pub fn unexpected_output(model_name: impl Into<String>, details: impl Into<String>) -> Self {
        let details = details.into();
        Self::Inference {
            model_name: model_name.into(),
            context: details.clone(),
            source: Box::new(SimpleError::new(details)),
        }
    }

    /// Creates a configuration error with context and details.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use oar_ocr_gateway::core::errors::OCRError;
    /// let err = OCRError::config_error_detailed(
    ///     "model cache",
    ///     "recognizer tiers must be ordered by capacity"
    /// );
    /// assert!(matches!(err, OCRError::ConfigError { .. }));
    /// ```
    pub fn config_error_detailed(context: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ConfigError {
            message: format!("{}: {}", context.into(), details.into()),
        }
    }

    /// Creates an error for a model (or model resource) that failed to load.
    ///
    /// # Arguments
    /// * `model_path` - Path to the model file
    /// * `reason` - Short reason description
    /// * `suggestion` - Optional suggestion message (without punctuation)
    /// * `source` - Optional underlying error
    pub fn model_load_error(
        model_path: impl AsRef<std::path::Path>,
        reason: impl Into<String>,
        suggestion: Option<&str>,
        source: Option<impl std::error::Error + Send + Sync + 'static>,
    ) -> Self {
        let suggestion = suggestion
            .map(|s| format!("; suggested fix: {}", s))
            .unwrap_or_default();
        Self::ModelLoad {
            model_path: model_path.as_ref().display().to_string(),
            reason: reason.into(),
            suggestion,
            source: source.map(|e| Box::new(e) as _),
        }
    }
}

/// Convenience alias used across the pipeline.
pub type OcrResult<T> = Result<T, OCRError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_model_load_error_message_includes_suggestion() {
        let err = OCRError::model_load_error(
            "model/deim.onnx",
            "file not found",
            Some("check the model bundle"),
            None::<SimpleError>,
        );
        let message = err.to_string();
        assert!(message.contains("model/deim.onnx"));
        assert!(message.contains("file not found"));
        assert!(message.contains("suggested fix: check the model bundle"));
    }

    #[test]
    fn test_processing_error_keeps_source() {
        let err = OCRError::processing(
            ProcessingStage::TextRecognition,
            "tier 'parseq-30'",
            SimpleError::new("session poisoned"),
        );
        assert_eq!(err.to_string(), "text recognition failed: tier 'parseq-30'");
        assert_eq!(
            err.source().map(|s| s.to_string()),
            Some("session poisoned".to_string())
        );
    }
}
