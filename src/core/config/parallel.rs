//! Parallelism settings for the recognition cascade.

use crate::core::errors::OCRError;
use serde::{Deserialize, Serialize};

/// Controls how text lines inside one cascade tier are spread over threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of recognition threads.
    /// If None, the pool is sized to the number of available cores.
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Batches with at most this many lines run sequentially on the caller thread.
    /// Default: 2
    #[serde(default = "ParallelPolicy::default_recognition_threshold")]
    pub recognition_threshold: usize,
}

impl ParallelPolicy {
    /// Create a new ParallelPolicy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of threads.
    pub fn with_max_threads(mut self, max_threads: Option<usize>) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the sequential threshold for recognition batches.
    pub fn with_recognition_threshold(mut self, threshold: usize) -> Self {
        self.recognition_threshold = threshold;
        self
    }

    /// Builds the dedicated, bounded thread pool used for recognition.
    ///
    /// The pool is private to the cascade so that recognition never competes
    /// with other users of the global rayon pool.
    pub fn build_recognition_pool(&self) -> Result<rayon::ThreadPool, OCRError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|idx| format!("ocr-recognize-{idx}"));
        if let Some(num_threads) = self.max_threads {
            builder = builder.num_threads(num_threads.max(1));
        }
        builder
            .build()
            .map_err(|e| OCRError::config_error_detailed("recognition thread pool", e.to_string()))
    }

    /// Number of recognition threads the pool will run.
    pub fn thread_count(&self) -> usize {
        match self.max_threads {
            Some(n) => n.max(1),
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }

    /// Whether a batch of `len` lines should be fanned out to the pool.
    pub fn should_parallelize(&self, len: usize) -> bool {
        len > self.recognition_threshold
    }

    fn default_recognition_threshold() -> usize {
        2
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            recognition_threshold: Self::default_recognition_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        let policy = ParallelPolicy::new().with_recognition_threshold(3);
        assert!(!policy.should_parallelize(3));
        assert!(policy.should_parallelize(4));
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = ParallelPolicy::new()
            .with_max_threads(Some(2))
            .build_recognition_pool()
            .expect("pool");
        assert_eq!(pool.current_num_threads(), 2);
    }

    #[test]
    fn test_thread_count() {
        assert_eq!(ParallelPolicy::new().with_max_threads(Some(3)).thread_count(), 3);
        assert_eq!(ParallelPolicy::new().with_max_threads(Some(0)).thread_count(), 1);
        assert!(ParallelPolicy::new().thread_count() >= 1);
    }

    #[test]
    fn test_serde_defaults() {
        let policy: ParallelPolicy = serde_json::from_str("{}").expect("policy");
        assert_eq!(policy.max_threads, None);
        assert_eq!(policy.recognition_threshold, 2);
    }
}
