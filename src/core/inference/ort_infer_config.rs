use super::*;
use crate::core::config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};

impl From<OrtGraphOptimizationLevel> for GraphOptimizationLevel {
    fn from(level: OrtGraphOptimizationLevel) -> Self {
        match level {
            OrtGraphOptimizationLevel::DisableAll => GraphOptimizationLevel::Disable,
            OrtGraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
            OrtGraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
            OrtGraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        }
    }
}

/// ONNX Runtime severity: 0 verbose, 1 info, 2 warning, 3 error, 4 fatal.
/// Anything unset or unknown keeps runtime chatter at `Error`.
fn log_level(severity: Option<i32>) -> LogLevel {
    match severity {
        Some(0) => LogLevel::Verbose,
        Some(1) => LogLevel::Info,
        Some(2) => LogLevel::Warning,
        Some(level) if level >= 4 => LogLevel::Fatal,
        _ => LogLevel::Error,
    }
}

impl OrtExecutionProvider {
    fn dispatch(&self) -> Result<ExecutionProviderDispatch, ort::Error> {
        match self {
            Self::CPU => Ok(ort::execution_providers::CPUExecutionProvider::default().build()),
            #[cfg(feature = "cuda")]
            Self::CUDA {
                device_id,
                gpu_mem_limit,
            } => {
                let mut cuda = ort::execution_providers::CUDAExecutionProvider::default();
                if let Some(id) = device_id {
                    cuda = cuda.with_device_id(*id);
                }
                if let Some(limit) = gpu_mem_limit {
                    cuda = cuda.with_memory_limit(*limit);
                }
                Ok(cuda.build())
            }
            #[cfg(not(feature = "cuda"))]
            Self::CUDA { .. } => Err(ort::Error::new(
                "CUDA execution provider requested but the `cuda` feature is not enabled",
            )),
        }
    }
}

impl OrtInfer {
    /// Applies thread counts, graph optimization, log level and execution
    /// providers from `cfg` to a session builder.
    pub(super) fn apply_ort_config(
        mut builder: SessionBuilder,
        cfg: &OrtSessionConfig,
    ) -> Result<SessionBuilder, ort::Error> {
        if let Some(threads) = cfg.intra_threads {
            builder = builder.with_intra_threads(threads)?;
        }
        if let Some(threads) = cfg.inter_threads {
            builder = builder.with_inter_threads(threads)?;
        }
        if let Some(level) = cfg.optimization_level {
            builder = builder.with_optimization_level(level.into())?;
        }
        builder = builder.with_log_level(log_level(cfg.log_severity_level))?;

        let providers = cfg
            .execution_providers
            .iter()
            .flatten()
            .map(OrtExecutionProvider::dispatch)
            .collect::<Result<Vec<_>, _>>()?;
        if !providers.is_empty() {
            builder = builder.with_execution_providers(providers)?;
        }
        Ok(builder)
    }
}
