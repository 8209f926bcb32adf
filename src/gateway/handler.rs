//! Invocation entry point.
//!
//! An invocation moves through
//! `RECEIVED -> VALIDATED -> NORMALIZED -> PROCESSING (per page) -> ASSEMBLED`,
//! then releases its workspace and returns. Every exit path, successful or
//! not, goes through the release step.

use crate::core::errors::{OCRError, ProcessingStage};
use crate::gateway::config::HandlerConfig;
use crate::gateway::error::InvocationError;
use crate::gateway::normalizer::InputNormalizer;
use crate::gateway::pdf::{PdfRasterizer, PdfiumRasterizer};
use crate::gateway::request::InvocationRequest;
use crate::gateway::storage::{HttpObjectStore, ObjectStoreRouter, S3ObjectStore};
use crate::gateway::workspace::InvocationWorkspace;
use crate::oarocr::{CacheHandle, InvocationResult, PageProcessor};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Response envelope returned to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: ResponseBody,
}

/// Success or error payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Pages(InvocationResult),
    Error { error: String },
}

impl InvocationResponse {
    /// A 200 response carrying page results.
    pub fn success(result: InvocationResult) -> Self {
        Self {
            status_code: 200,
            body: ResponseBody::Pages(result),
        }
    }

    /// An error response for `err`, without any internal detail.
    pub fn failure(err: &InvocationError) -> Self {
        Self {
            status_code: err.status_code(),
            body: ResponseBody::Error {
                error: err.public_message(),
            },
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Page results, if successful.
    pub fn result(&self) -> Option<&InvocationResult> {
        match &self.body {
            ResponseBody::Pages(result) => Some(result),
            ResponseBody::Error { .. } => None,
        }
    }
}

/// Builder for [`RequestHandler`].
pub struct RequestHandlerBuilder {
    cache: CacheHandle,
    config: HandlerConfig,
    stores: Option<ObjectStoreRouter>,
    rasterizer: Option<Arc<dyn PdfRasterizer>>,
}

impl RequestHandlerBuilder {
    /// Uses `stores` instead of the default S3 (and optional HTTP) stores.
    pub fn object_stores(mut self, stores: ObjectStoreRouter) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Uses `rasterizer` instead of PDFium.
    pub fn rasterizer(mut self, rasterizer: Arc<dyn PdfRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Builds the handler. Loads AWS configuration when no stores were given.
    pub async fn build(self) -> Result<RequestHandler, OCRError> {
        self.config.validate()?;

        let stores = match self.stores {
            Some(stores) => stores,
            None => {
                let mut stores = ObjectStoreRouter::new()
                    .with_store("s3", Arc::new(S3ObjectStore::from_env().await));
                if self.config.allow_http_sources {
                    let http = Arc::new(HttpObjectStore::new());
                    stores = stores
                        .with_store("http", http.clone())
                        .with_store("https", http);
                }
                stores
            }
        };
        let rasterizer = match self.rasterizer {
            Some(rasterizer) => rasterizer,
            None => {
                let mut pdfium = PdfiumRasterizer::new();
                if let Some(dir) = &self.config.pdfium_library_dir {
                    pdfium = pdfium.with_library_dir(dir);
                }
                Arc::new(pdfium)
            }
        };

        Ok(RequestHandler {
            normalizer: InputNormalizer::new(stores, rasterizer, self.config.render_settings()),
            processor: Arc::new(PageProcessor::new(self.config.page_processor.clone())),
            cache: self.cache,
            config: self.config,
        })
    }
}

/// Serves invocations against a shared model cache.
#[derive(Debug)]
pub struct RequestHandler {
    cache: CacheHandle,
    config: HandlerConfig,
    normalizer: InputNormalizer,
    processor: Arc<PageProcessor>,
}

impl RequestHandler {
    /// Starts building a handler.
    pub fn builder(cache: CacheHandle, config: HandlerConfig) -> RequestHandlerBuilder {
        RequestHandlerBuilder {
            cache,
            config,
            stores: None,
            rasterizer: None,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Handles a raw JSON document, answering malformed JSON with a 400.
    pub async fn handle_bytes(&self, raw: &[u8], request_id: Option<&str>) -> InvocationResponse {
        match serde_json::from_slice::<Value>(raw) {
            Ok(value) => self.handle(value, request_id).await,
            Err(e) => {
                let err = InvocationError::validation(format!("request is not valid JSON: {e}"));
                warn!(error = %err, "request rejected");
                InvocationResponse::failure(&err)
            }
        }
    }

    /// Handles one invocation. Never fails; errors become error responses.
    pub async fn handle(&self, raw: Value, request_id: Option<&str>) -> InvocationResponse {
        let request_id = request_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = info_span!("invocation", request_id = %request_id);
        self.handle_inner(raw, &request_id).instrument(span).await
    }

    async fn handle_inner(&self, raw: Value, request_id: &str) -> InvocationResponse {
        let started = Instant::now();
        debug!("request received");

        let request = match InvocationRequest::from_value(&raw) {
            Ok(request) => request,
            Err(e) => return Self::report(e),
        };
        debug!("request validated");

        let created = InvocationWorkspace::create(&self.config.work_root, Some(request_id));
        let mut workspace = match created {
            Ok(workspace) => workspace,
            Err(e) => return Self::report(InvocationError::processing(None, OCRError::Io(e))),
        };

        let outcome = self.run(&request, &workspace).await;

        if let Err(e) = workspace.release() {
            warn!(error = %e, "workspace cleanup failed");
        }

        match outcome {
            Ok(result) => {
                info!(
                    pages = result.pages.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "invocation completed"
                );
                InvocationResponse::success(result)
            }
            Err(e) => Self::report(e),
        }
    }

    async fn run(
        &self,
        request: &InvocationRequest,
        workspace: &InvocationWorkspace,
    ) -> Result<InvocationResult, InvocationError> {
        let input = self.normalizer.normalize(request, workspace).await?;
        debug!(
            pages = input.pages.len(),
            multi_page = input.is_multi_page,
            "request normalized"
        );

        let mut results = Vec::with_capacity(input.pages.len());
        for page in input.pages {
            let page_number = page.page_number;
            let cache = Arc::clone(&self.cache);
            let processor = Arc::clone(&self.processor);
            let result = tokio::task::spawn_blocking(move || processor.process(&page, &cache))
                .await
                .map_err(|e| {
                    InvocationError::processing(
                        Some(page_number),
                        OCRError::processing(ProcessingStage::Generic, "page task", e),
                    )
                })?
                .map_err(|e| InvocationError::processing(Some(page_number), e))?;
            debug!(page = page_number, regions = result.contents.len(), "page processed");
            results.push(result);
        }

        Ok(InvocationResult::from_pages(results))
    }

    fn report(err: InvocationError) -> InvocationResponse {
        let status = err.status_code();
        if status >= 500 {
            error!(status, error = %err.detailed_message(), "invocation failed");
        } else {
            warn!(status, error = %err, "invocation rejected");
        }
        InvocationResponse::failure(&err)
    }
}
