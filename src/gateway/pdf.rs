//! PDF page rasterization.

use image::RgbImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("failed to initialize PDFium: {0}")]
    Init(String),

    #[error("failed to load PDF: {0}")]
    Load(String),

    #[error("failed to render page {page}: {message}")]
    Render { page: u32, message: String },

    #[error("PDF has no pages")]
    Empty,

    #[error("{0}")]
    Selection(String),

    #[error("failed to store page {page}")]
    Output {
        page: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Rendering resolution and size cap.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfRenderSettings {
    /// Dots per inch (default: 300)
    pub dpi: f32,
    /// Longest side of a rendered page in pixels (default: 10000)
    pub max_dimension: u32,
}

impl Default for PdfRenderSettings {
    fn default() -> Self {
        Self {
            dpi: 300.0,
            max_dimension: 10_000,
        }
    }
}

impl PdfRenderSettings {
    /// Pixel size for a page of `width_pt` x `height_pt` points.
    pub fn target_size(&self, width_pt: f32, height_pt: f32) -> (u32, u32) {
        // 72 points per inch
        let scale = self.dpi / 72.0;
        let mut width = width_pt * scale;
        let mut height = height_pt * scale;

        let longest = width.max(height);
        let cap = self.max_dimension as f32;
        if longest > cap {
            let ratio = cap / longest;
            width *= ratio;
            height *= ratio;
        }
        ((width.round() as u32).max(1), (height.round() as u32).max(1))
    }
}

/// Callback receiving each rendered page as `(page_number, image)`.
pub type PageSink<'a> = dyn FnMut(u32, RgbImage) -> Result<(), PdfError> + 'a;

/// Picks the 1-based pages to render once the page count is known.
pub type PagePlanner<'a> = dyn FnMut(u32) -> Result<Vec<u32>, PdfError> + 'a;

/// Turns PDF bytes into page rasters.
pub trait PdfRasterizer: Send + Sync {
    /// Loads the document once, asks `plan` which pages to render given its
    /// page count, then renders those pages in order, handing each to `sink`
    /// as soon as it is ready.
    ///
    /// A document without pages is [`PdfError::Empty`]; `plan` is not called.
    fn render_pages(
        &self,
        data: &[u8],
        settings: &PdfRenderSettings,
        plan: &mut PagePlanner<'_>,
        sink: &mut PageSink<'_>,
    ) -> Result<(), PdfError>;
}

/// [`PdfRasterizer`] backed by the PDFium library.
///
/// The library is bound once per document, looking in `library_dir` first
/// and then in the usual system locations.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Creates a rasterizer that searches the default locations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks for the PDFium shared library in `dir` first.
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    fn bind(&self) -> Result<Pdfium, PdfError> {
        let explicit = self
            .library_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_else(|| "./".to_string());

        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
            &explicit,
        ))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/opt/lib"))
        })
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("/usr/lib"))
        })
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/usr/local/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PdfError::Init(format!("could not find PDFium library: {e}")))?;

        Ok(Pdfium::new(bindings))
    }

    fn render_page(
        page: &PdfPage,
        page_number: u32,
        settings: &PdfRenderSettings,
    ) -> Result<RgbImage, PdfError> {
        let (width, height) = settings.target_size(page.width().value, page.height().value);

        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PdfError::Render {
                page: page_number,
                message: e.to_string(),
            })?;

        Ok(bitmap.as_image().to_rgb8())
    }
}

impl PdfRasterizer for PdfiumRasterizer {
    fn render_pages(
        &self,
        data: &[u8],
        settings: &PdfRenderSettings,
        plan: &mut PagePlanner<'_>,
        sink: &mut PageSink<'_>,
    ) -> Result<(), PdfError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(data, None)
            .map_err(|e| PdfError::Load(e.to_string()))?;
        let pages = document.pages();

        let count = match pages.len() {
            0 => return Err(PdfError::Empty),
            count => u32::from(count),
        };
        for page_number in plan(count)? {
            let index = page_number
                .checked_sub(1)
                .filter(|&i| i < count)
                .and_then(|i| u16::try_from(i).ok())
                .ok_or(PdfError::Render {
                    page: page_number,
                    message: "page number out of range".to_string(),
                })?;
            let page = pages.get(index).map_err(|e| PdfError::Render {
                page: page_number,
                message: e.to_string(),
            })?;
            let image = Self::render_page(&page, page_number, settings)?;
            sink(page_number, image)?;
        }
        Ok(())
    }
}

/// Check if bytes represent a PDF file (magic bytes: %PDF-)
pub fn is_pdf_bytes(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}
