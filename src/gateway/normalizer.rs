//! Turns a request payload into page rasters inside the invocation workspace.
//!
//! The payload kind is decided by content sniffing only. PDFs are rendered
//! page by page; raster images are decoded and converted to 8-bit RGB. Each
//! page ends up as `page{NNNN}.png` in the workspace.

use crate::core::errors::{OCRError, ProcessingStage, SimpleError};
use crate::gateway::error::InvocationError;
use crate::gateway::pdf::{PdfError, PdfRasterizer, PdfRenderSettings, is_pdf_bytes};
use crate::gateway::request::{ImageSource, InvocationRequest, PageSelection};
use crate::gateway::storage::ObjectStoreRouter;
use crate::gateway::workspace::{InvocationWorkspace, page_file_name};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub use crate::oarocr::RasterPage;

const JP2_BOX_SIGNATURE: &[u8] = b"\x00\x00\x00\x0cjP  \r\n\x87\n";
const J2K_CODESTREAM_SIGNATURE: &[u8] = b"\xff\x4f\xff\x51";

/// Pages produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput {
    /// Page rasters in ascending page order.
    pub pages: Vec<RasterPage>,
    /// Whether the payload was a (potentially multi-page) PDF.
    pub is_multi_page: bool,
}

/// What the payload bytes turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Pdf,
    Image(ImageFormat),
}

/// Identifies the payload from its leading bytes.
pub fn sniff_payload(data: &[u8]) -> Result<PayloadKind, InvocationError> {
    if data.is_empty() {
        return Err(InvocationError::validation("payload is empty"));
    }
    if is_pdf_bytes(data) {
        return Ok(PayloadKind::Pdf);
    }
    if data.starts_with(JP2_BOX_SIGNATURE) || data.starts_with(J2K_CODESTREAM_SIGNATURE) {
        return Err(InvocationError::validation(
            "JPEG 2000 payloads are not supported; send PNG, JPEG, TIFF, BMP, GIF, WebP or PDF",
        ));
    }
    image::guess_format(data)
        .map(PayloadKind::Image)
        .map_err(|_| {
            InvocationError::validation("unrecognized payload: not a PDF or a supported image")
        })
}

/// Decodes inline base64, with or without a `data:<mime>;base64,` prefix.
pub fn decode_inline(payload: &str) -> Result<Vec<u8>, InvocationError> {
    let payload = payload.trim();
    let payload = match payload.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| InvocationError::validation("malformed data URL: missing ','"))?,
        None => payload,
    };
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let data = STANDARD.decode(compact.as_bytes()).map_err(|e| {
        InvocationError::validation(format!("failed to decode base64 image data: {e}"))
    })?;
    if data.is_empty() {
        return Err(InvocationError::validation("payload is empty"));
    }
    Ok(data)
}

/// Fetches or decodes the payload and writes page rasters.
#[derive(Clone)]
pub struct InputNormalizer {
    stores: ObjectStoreRouter,
    rasterizer: Arc<dyn PdfRasterizer>,
    render: PdfRenderSettings,
}

impl std::fmt::Debug for InputNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputNormalizer")
            .field("stores", &self.stores)
            .field("render", &self.render)
            .finish()
    }
}

impl InputNormalizer {
    /// Creates a normalizer.
    pub fn new(
        stores: ObjectStoreRouter,
        rasterizer: Arc<dyn PdfRasterizer>,
        render: PdfRenderSettings,
    ) -> Self {
        Self {
            stores,
            rasterizer,
            render,
        }
    }

    /// Produces the page rasters for `request` in `workspace`.
    ///
    /// Decoding and rendering run on the blocking thread pool.
    pub async fn normalize(
        &self,
        request: &InvocationRequest,
        workspace: &InvocationWorkspace,
    ) -> Result<NormalizedInput, InvocationError> {
        let data = match &request.image {
            ImageSource::Remote(uri) => self.stores.fetch(uri).await?,
            ImageSource::Inline(payload) => decode_inline(payload)?,
        };

        let this = self.clone();
        let pages = request.pages.clone();
        let dir = workspace.path().to_path_buf();
        tokio::task::spawn_blocking(move || this.normalize_bytes(&data, pages.as_ref(), &dir))
            .await
            .map_err(|e| {
                InvocationError::processing(
                    None,
                    OCRError::processing(ProcessingStage::Preprocessing, "input normalization", e),
                )
            })?
    }

    /// Synchronous core of [`normalize`](Self::normalize): writes the pages
    /// of `data` into `dir`.
    pub fn normalize_bytes(
        &self,
        data: &[u8],
        pages: Option<&PageSelection>,
        dir: &Path,
    ) -> Result<NormalizedInput, InvocationError> {
        let started = Instant::now();
        let kind = sniff_payload(data)?;
        let rasters = match kind {
            PayloadKind::Pdf => self.rasterize_pdf(data, pages, dir)?,
            PayloadKind::Image(format) => {
                if pages.is_some() {
                    debug!("page selection ignored for a single image");
                }
                vec![write_image(data, format, dir)?]
            }
        };

        for page in &rasters {
            if !page.path.is_file() {
                return Err(InvocationError::processing(
                    Some(page.page_number),
                    OCRError::processing(
                        ProcessingStage::Preprocessing,
                        format!("page {} raster was not written", page.page_number),
                        SimpleError::new("expected page image file not found"),
                    ),
                ));
            }
        }

        info!(
            kind = ?kind,
            pages = rasters.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "input normalized"
        );
        Ok(NormalizedInput {
            pages: rasters,
            is_multi_page: kind == PayloadKind::Pdf,
        })
    }

    fn rasterize_pdf(
        &self,
        data: &[u8],
        pages: Option<&PageSelection>,
        dir: &Path,
    ) -> Result<Vec<RasterPage>, InvocationError> {
        let mut selected = Vec::new();
        let mut plan = |count: u32| -> Result<Vec<u32>, PdfError> {
            selected = match pages {
                Some(selection) => selection
                    .resolve(count)
                    .map_err(|e| PdfError::Selection(e.to_string()))?,
                None => (1..=count).collect(),
            };
            debug!(page_count = count, selected = selected.len(), "rendering PDF");
            Ok(selected.clone())
        };

        let mut rasters = Vec::new();
        let mut sink = |page_number: u32, image: RgbImage| -> Result<(), PdfError> {
            let path = save_png(&image, dir, page_number).map_err(|e| PdfError::Output {
                page: page_number,
                source: Box::new(e),
            })?;
            rasters.push(RasterPage {
                path,
                width: image.width(),
                height: image.height(),
                page_number,
            });
            Ok(())
        };
        self.rasterizer
            .render_pages(data, &self.render, &mut plan, &mut sink)
            .map_err(pdf_error)?;

        if rasters.len() != selected.len() {
            return Err(InvocationError::processing(
                None,
                OCRError::processing(
                    ProcessingStage::Rasterization,
                    format!("rendered {} of {} pages", rasters.len(), selected.len()),
                    SimpleError::new("PDF renderer skipped pages"),
                ),
            ));
        }
        Ok(rasters)
    }
}

fn write_image(
    data: &[u8],
    format: ImageFormat,
    dir: &Path,
) -> Result<RasterPage, InvocationError> {
    let image = image::load_from_memory_with_format(data, format)
        .map_err(|e| InvocationError::validation(format!("cannot decode image data: {e}")))?
        .to_rgb8();
    let path = save_png(&image, dir, 1).map_err(|e| InvocationError::processing(Some(1), e))?;
    Ok(RasterPage {
        path,
        width: image.width(),
        height: image.height(),
        page_number: 1,
    })
}

fn save_png(image: &RgbImage, dir: &Path, page_number: u32) -> Result<PathBuf, OCRError> {
    let path = dir.join(page_file_name(page_number));
    image
        .save_with_format(&path, ImageFormat::Png)
        .map_err(|e| {
            OCRError::processing(
                ProcessingStage::Preprocessing,
                format!("writing page {page_number} raster"),
                e,
            )
        })?;
    Ok(path)
}

fn pdf_error(err: PdfError) -> InvocationError {
    match err {
        PdfError::Load(_) | PdfError::Empty => {
            InvocationError::validation(format!("cannot open PDF: {err}"))
        }
        PdfError::Selection(message) => InvocationError::validation(message),
        PdfError::Render { page, .. } | PdfError::Output { page, .. } => {
            InvocationError::processing(
                Some(page),
                OCRError::processing(ProcessingStage::Rasterization, "PDF page", err),
            )
        }
        PdfError::Init(_) => InvocationError::processing(
            None,
            OCRError::processing(ProcessingStage::Rasterization, "PDF renderer", err),
        ),
    }
}
