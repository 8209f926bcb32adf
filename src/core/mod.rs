//! The core module of the OCR pipeline.
//!
//! This module contains the pieces every other module builds on:
//! - Configuration (ONNX Runtime sessions, parallelism, model bundle paths)
//! - Error handling
//! - ONNX Runtime session pooling
//! - Traits for the layout detector and the text recognizers

pub mod config;
pub mod errors;
pub mod inference;
pub mod traits;

pub use config::{ModelBundleConfig, OrtSessionConfig, ParallelPolicy};
pub use errors::{OCRError, OcrResult, ProcessingStage};
pub use inference::OrtInfer;
pub use traits::{LayoutDetection, LayoutDetector, LengthHint, Recognition, TextRecognizer};

/// A batch of NCHW `f32` images.
pub type Tensor4D = ndarray::Array4<f32>;
