//! Gateway adapter: request validation, input normalization and the
//! invocation handler.
//!
//! The gateway supplies an untyped mapping such as
//! `{"image": "s3://bucket/scan.pdf", "pages": "1-3"}` and expects a
//! `{"statusCode": ..., "body": {...}}` envelope back. [`RequestHandler`] is
//! the only entry point the outside world needs.

pub mod config;
pub mod error;
pub mod handler;
pub mod normalizer;
pub mod pdf;
pub mod request;
pub mod storage;
pub mod workspace;

pub use config::HandlerConfig;
pub use error::{InvocationError, RetrievalCause};
pub use handler::{InvocationResponse, RequestHandler, RequestHandlerBuilder, ResponseBody};
pub use normalizer::{InputNormalizer, NormalizedInput, PayloadKind, RasterPage};
pub use pdf::{PdfError, PdfRasterizer, PdfRenderSettings, PdfiumRasterizer, is_pdf_bytes};
pub use request::{ImageSource, InvocationRequest, PageSelection, StorageUri};
pub use storage::{HttpObjectStore, ObjectStore, ObjectStoreRouter, S3ObjectStore};
pub use workspace::InvocationWorkspace;
