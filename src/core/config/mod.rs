//! Configuration types for the OCR pipeline.

pub mod models;
pub mod onnx;
pub mod parallel;

pub use models::{ModelBundleConfig, RecognizerModelConfig};
pub use onnx::*;
pub use parallel::ParallelPolicy;
