//! # OAR OCR Gateway
//!
//! Serves a document OCR pipeline (one layout detector plus a cascade of three
//! text recognizers, all ONNX) as a single request/response tool.
//!
//! A request carries an image or PDF either inline (base64) or as an object
//! storage reference. The gateway decodes it into page rasters, runs layout
//! detection, orders the detected regions for reading, recognizes every text
//! line with the smallest recognizer that can hold it, and answers with a
//! per-page JSON document.
//!
//! ## Modules
//!
//! * [`core`] - Error types, ONNX Runtime configuration and session handling
//! * [`models`] - The DEIM layout detector and PARSeq recognizers
//! * [`processors`] - Geometry and reading-order utilities
//! * [`oarocr`] - Model cache, recognition cascade and the page processor
//! * [`gateway`] - Request parsing, input normalization and the request handler
//! * [`utils`] - Cropping helpers and logging setup
//!
//! ## Example
//!
//! ```rust,no_run
//! use oar_ocr_gateway::core::config::{ModelBundleConfig, OrtSessionConfig, ParallelPolicy};
//! use oar_ocr_gateway::gateway::{HandlerConfig, RequestHandler};
//! use oar_ocr_gateway::oarocr::ModelCache;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let bundle = ModelBundleConfig::from_root("models");
//! let cache = ModelCache::initialize(
//!     &bundle,
//!     &OrtSessionConfig::default(),
//!     &ParallelPolicy::default(),
//! )?;
//! let handler = RequestHandler::builder(cache, HandlerConfig::default())
//!     .build()
//!     .await?;
//!
//! let event = serde_json::json!({ "image": "s3://bucket/scan.pdf", "pages": "1-2" });
//! let response = handler.handle(event, None).await;
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod gateway;
pub mod models;
pub mod oarocr;
pub mod processors;
pub mod utils;
