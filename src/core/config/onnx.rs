//! ONNX Runtime session settings shared by the detector and the recognizers.

use serde::{Deserialize, Serialize};

/// Graph optimization levels for ONNX Runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum OrtGraphOptimizationLevel {
    /// Disable all optimizations.
    DisableAll,
    /// Enable basic optimizations.
    #[default]
    Level1,
    /// Enable extended optimizations.
    Level2,
    /// Enable all optimizations.
    Level3,
}

/// Execution providers for ONNX Runtime.
///
/// CPU is always available; CUDA requires the `cuda` feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum OrtExecutionProvider {
    /// CPU execution provider
    #[default]
    CPU,
    /// NVIDIA CUDA execution provider
    CUDA {
        /// CUDA device ID (default: 0)
        device_id: Option<i32>,
        /// Memory limit in bytes
        gpu_mem_limit: Option<usize>,
    },
}

impl OrtExecutionProvider {
    /// Parses a device string such as `cpu`, `cuda` or `cuda:1`.
    ///
    /// Returns `None` for anything else.
    pub fn parse_device(device: &str) -> Option<Self> {
        let device = device.trim().to_ascii_lowercase();
        match device.as_str() {
            "cpu" => Some(Self::CPU),
            "cuda" | "gpu" => Some(Self::CUDA {
                device_id: Some(0),
                gpu_mem_limit: None,
            }),
            other => {
                let id = other
                    .strip_prefix("cuda:")
                    .or_else(|| other.strip_prefix("gpu:"))?;
                id.parse::<i32>().ok().map(|id| Self::CUDA {
                    device_id: Some(id),
                    gpu_mem_limit: None,
                })
            }
        }
    }
}

/// Configuration for ONNX Runtime sessions.
///
/// Every field is optional; unset fields leave the runtime defaults in place,
/// except the log level, which defaults to errors only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrtSessionConfig {
    /// Threads used to parallelize execution within nodes
    pub intra_threads: Option<usize>,
    /// Threads used to parallelize execution across nodes
    pub inter_threads: Option<usize>,
    /// Graph optimization level
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
    /// Log severity level (0=Verbose, 1=Info, 2=Warning, 3=Error, 4=Fatal)
    pub log_severity_level: Option<i32>,
    /// Number of sessions created per model. Calls rotate over the pool.
    pub session_pool_size: Option<usize>,
}

impl OrtSessionConfig {
    /// Creates a new OrtSessionConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of intra-op threads.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    /// Sets the number of inter-op threads.
    pub fn with_inter_threads(mut self, threads: usize) -> Self {
        self.inter_threads = Some(threads);
        self
    }

    /// Sets the graph optimization level.
    pub fn with_optimization_level(mut self, level: OrtGraphOptimizationLevel) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Adds a single execution provider.
    pub fn add_execution_provider(mut self, provider: OrtExecutionProvider) -> Self {
        self.execution_providers
            .get_or_insert_with(Vec::new)
            .push(provider);
        self
    }

    /// Sets the log severity level.
    pub fn with_log_severity_level(mut self, level: i32) -> Self {
        self.log_severity_level = Some(level);
        self
    }

    /// Sets how many sessions each model keeps.
    pub fn with_session_pool_size(mut self, size: usize) -> Self {
        self.session_pool_size = Some(size);
        self
    }

    /// Effective session pool size (at least 1).
    pub fn pool_size(&self) -> usize {
        self.session_pool_size.unwrap_or(1).max(1)
    }

    /// Gets the execution providers, defaulting to CPU.
    pub fn get_execution_providers(&self) -> Vec<OrtExecutionProvider> {
        self.execution_providers
            .clone()
            .unwrap_or_else(|| vec![OrtExecutionProvider::CPU])
    }
}
