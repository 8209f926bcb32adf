//! Runtime options shared by the `invoke` and `serve` commands.

use clap::Args;
use oar_ocr_gateway::core::config::{
    ModelBundleConfig, OrtExecutionProvider, OrtSessionConfig, ParallelPolicy,
};
use oar_ocr_gateway::gateway::{HandlerConfig, RequestHandler};
use oar_ocr_gateway::oarocr::{CascadeConfig, ModelCell, PageProcessorConfig};
use std::path::PathBuf;
use tracing::info;

/// Models are loaded once per process, whichever command asks first.
static MODELS: ModelCell = ModelCell::new();

/// Model, runtime and request handling options.
#[derive(Args, Debug, Clone)]
pub struct RuntimeArgs {
    /// Model bundle root (containing model/ and config/)
    #[arg(long = "model-dir", env = "OAR_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,

    /// Device to use (cpu, cuda, cuda:0, etc.)
    #[arg(long, default_value = "cpu", env = "OAR_DEVICE")]
    pub device: String,

    /// Number of recognition threads (defaults to number of CPUs)
    #[arg(long, env = "OAR_WORKERS")]
    pub workers: Option<usize>,

    /// ONNX sessions per model (defaults to the number of recognition threads)
    #[arg(long = "session-pool-size", env = "OAR_SESSION_POOL_SIZE")]
    pub session_pool_size: Option<usize>,

    /// Directory for per-invocation workspaces (defaults to the system temp dir)
    #[arg(long = "work-dir", env = "OAR_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// PDF rendering resolution
    #[arg(long = "pdf-dpi", default_value = "300", env = "OAR_PDF_DPI")]
    pub pdf_dpi: f32,

    /// Directory containing the PDFium shared library
    #[arg(long = "pdfium-dir", env = "OAR_PDFIUM_DIR")]
    pub pdfium_dir: Option<PathBuf>,

    /// Accept http:// and https:// payload URIs
    #[arg(long = "allow-http", env = "OAR_ALLOW_HTTP")]
    pub allow_http: bool,

    /// Start lines at the recognizer tier suggested by the detector
    #[arg(long = "use-length-hints", env = "OAR_USE_LENGTH_HINTS")]
    pub use_length_hints: bool,

    /// Report non-text layout blocks alongside text lines
    #[arg(long = "include-layout-blocks", env = "OAR_INCLUDE_LAYOUT_BLOCKS")]
    pub include_layout_blocks: bool,
}

impl RuntimeArgs {
    pub fn bundle(&self) -> ModelBundleConfig {
        match &self.model_dir {
            Some(dir) => ModelBundleConfig::from_root(dir),
            None => ModelBundleConfig::from_env(),
        }
    }

    /// Session settings. Each model keeps one session per recognition thread
    /// unless `--session-pool-size` is given.
    pub fn ort_config(&self) -> Result<OrtSessionConfig, String> {
        let provider = OrtExecutionProvider::parse_device(&self.device)
            .ok_or_else(|| format!("unsupported device '{}'", self.device))?;
        let pool_size = self
            .session_pool_size
            .unwrap_or_else(|| self.parallel_policy().thread_count());
        Ok(OrtSessionConfig::new()
            .add_execution_provider(provider)
            .with_session_pool_size(pool_size))
    }

    pub fn parallel_policy(&self) -> ParallelPolicy {
        ParallelPolicy::new().with_max_threads(self.workers)
    }

    pub fn handler_config(&self) -> HandlerConfig {
        let mut config = HandlerConfig::default()
            .with_pdf_dpi(self.pdf_dpi)
            .with_http_sources(self.allow_http)
            .with_page_processor(PageProcessorConfig {
                cascade: CascadeConfig {
                    use_length_hints: self.use_length_hints,
                    ..CascadeConfig::default()
                },
                include_layout_blocks: self.include_layout_blocks,
            });
        if let Some(dir) = &self.work_dir {
            config = config.with_work_root(dir);
        }
        config.pdfium_library_dir = self.pdfium_dir.clone();
        config
    }

    /// Loads the model bundle and builds the request handler.
    pub async fn build_handler(
        &self,
    ) -> Result<RequestHandler, Box<dyn std::error::Error + Send + Sync>> {
        let bundle = self.bundle();
        let ort = self.ort_config()?;
        let policy = self.parallel_policy();

        info!(root = %bundle.root.display(), device = %self.device, "initializing model cache");
        let cache =
            tokio::task::spawn_blocking(move || MODELS.initialize(&bundle, &ort, &policy))
                .await??;

        let handler = RequestHandler::builder(cache, self.handler_config())
            .build()
            .await?;
        Ok(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        runtime: RuntimeArgs,
    }

    fn args(argv: &[&str]) -> RuntimeArgs {
        let argv = std::iter::once("oar-ocr-gateway").chain(argv.iter().copied());
        Harness::try_parse_from(argv).expect("args").runtime
    }

    #[test]
    fn test_session_pool_follows_workers() {
        let ort = args(&["--workers", "4"]).ort_config().expect("ort");
        assert_eq!(ort.pool_size(), 4);
    }

    #[test]
    fn test_session_pool_override() {
        let ort = args(&["--workers", "4", "--session-pool-size", "2"])
            .ort_config()
            .expect("ort");
        assert_eq!(ort.pool_size(), 2);
    }

    #[test]
    fn test_unknown_device_is_rejected() {
        assert!(args(&["--device", "tpu"]).ort_config().is_err());
    }
}
