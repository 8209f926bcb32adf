//! Request handler configuration.

use crate::gateway::pdf::PdfRenderSettings;
use crate::oarocr::PageProcessorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for [`RequestHandler`](crate::gateway::RequestHandler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Directory under which per-invocation workspaces are created.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,
    /// PDF rendering resolution.
    #[serde(default = "default_pdf_dpi")]
    pub pdf_dpi: f32,
    /// Longest side of a rendered PDF page, in pixels.
    #[serde(default = "default_max_render_side")]
    pub max_render_side: u32,
    /// Accept `http://` and `https://` payload URIs.
    #[serde(default)]
    pub allow_http_sources: bool,
    /// Directory holding the PDFium shared library, if not on the default path.
    #[serde(default)]
    pub pdfium_library_dir: Option<PathBuf>,
    /// Page processing options.
    #[serde(default)]
    pub page_processor: PageProcessorConfig,
}

fn default_work_root() -> PathBuf {
    std::env::temp_dir()
}

fn default_pdf_dpi() -> f32 {
    300.0
}

fn default_max_render_side() -> u32 {
    10_000
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            pdf_dpi: default_pdf_dpi(),
            max_render_side: default_max_render_side(),
            allow_http_sources: false,
            pdfium_library_dir: None,
            page_processor: PageProcessorConfig::default(),
        }
    }
}

impl HandlerConfig {
    /// Sets the workspace root.
    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    /// Sets the PDF rendering resolution.
    pub fn with_pdf_dpi(mut self, dpi: f32) -> Self {
        self.pdf_dpi = dpi;
        self
    }

    /// Enables or disables HTTP payload URIs.
    pub fn with_http_sources(mut self, allow: bool) -> Self {
        self.allow_http_sources = allow;
        self
    }

    /// Sets the page processing options.
    pub fn with_page_processor(mut self, config: PageProcessorConfig) -> Self {
        self.page_processor = config;
        self
    }

    /// Rendering settings derived from this configuration.
    pub fn render_settings(&self) -> PdfRenderSettings {
        PdfRenderSettings {
            dpi: self.pdf_dpi,
            max_dimension: self.max_render_side,
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), crate::core::OCRError> {
        if !(self.pdf_dpi.is_finite() && self.pdf_dpi > 0.0) {
            return Err(crate::core::OCRError::config_error_detailed(
                "pdf_dpi",
                format!("must be a positive number, got {}", self.pdf_dpi),
            ));
        }
        if self.max_render_side == 0 {
            return Err(crate::core::OCRError::config_error_detailed(
                "max_render_side",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}
