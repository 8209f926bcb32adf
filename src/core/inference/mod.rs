//! ONNX Runtime integration.

mod ort_infer;

pub use ort_infer::OrtInfer;
