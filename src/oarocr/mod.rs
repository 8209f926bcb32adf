//! The OCR pipeline.
//!
//! - [`ModelCache`] - the detector and recognizer cascade, loaded once per process
//! - [`RecognitionCascade`] - escalating recognition over recognizers of growing capacity
//! - [`PageProcessor`] - runs detection, reading order and recognition over one page
//! - [`PageResult`] and friends - the per-page output documents

pub mod cache;
pub mod cascade;
pub mod page;
pub mod result;

pub use cache::{CacheHandle, ModelCache, ModelCell};
pub use cascade::{CascadeConfig, CascadeLine, CascadeOutcome, RecognitionCascade};
pub use page::{PageProcessor, PageProcessorConfig, RasterPage};
pub use result::{ImageInfo, InvocationResult, PageResult, TextRegion};
