//! Error handling for the OCR pipeline.

mod types;

pub use types::{OCRError, OcrResult, ProcessingStage, SimpleError};
