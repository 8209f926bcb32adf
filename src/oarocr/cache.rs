//! Process-wide model cache.
//!
//! Loading four ONNX models takes far longer than a typical invocation, so the
//! detector and the recognizer cascade are loaded once and then shared,
//! read-only, by every invocation through an [`Arc`].

use crate::core::config::{ModelBundleConfig, OrtSessionConfig, ParallelPolicy};
use crate::core::errors::OCRError;
use crate::core::traits::{LayoutDetector, TextRecognizer};
use crate::models::detection::DeimModelBuilder;
use crate::models::recognition::{Charset, ParseqModelBuilder};
use crate::oarocr::cascade::RecognitionCascade;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::info;

/// Shared handle to an initialized cache.
pub type CacheHandle = Arc<ModelCache>;

/// The layout detector and the recognition cascade.
#[derive(Debug)]
pub struct ModelCache {
    detector: Box<dyn LayoutDetector>,
    cascade: RecognitionCascade,
}

impl ModelCache {
    /// Loads every model of the bundle.
    ///
    /// Fails if any model or resource file is missing or unreadable; a partly
    /// loaded cache is never returned.
    pub fn initialize(
        bundle: &ModelBundleConfig,
        ort: &OrtSessionConfig,
        policy: &ParallelPolicy,
    ) -> Result<CacheHandle, OCRError> {
        let started = Instant::now();
        info!(root = %bundle.root.display(), "loading model bundle");

        let detector = DeimModelBuilder::new()
            .session_config(ort.clone())
            .build(bundle.detector_path(), bundle.class_map_path())?;

        let charset = Arc::new(Charset::from_file(bundle.charset_path())?);
        let mut tiers: Vec<Box<dyn TextRecognizer>> = Vec::with_capacity(bundle.recognizers.len());
        for tier in &bundle.recognizers {
            let model = ParseqModelBuilder::new()
                .capacity(tier.capacity)
                .session_config(ort.clone())
                .build(bundle.recognizer_path(tier), Arc::clone(&charset))?;
            tiers.push(Box::new(model));
        }

        let cache = Self::from_parts(Box::new(detector), tiers, policy)?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            charset = charset.len(),
            tiers = ?cache.cascade.capacities(),
            "model bundle loaded"
        );
        Ok(cache)
    }

    /// Builds a cache from already constructed models.
    pub fn from_parts(
        detector: Box<dyn LayoutDetector>,
        recognizers: Vec<Box<dyn TextRecognizer>>,
        policy: &ParallelPolicy,
    ) -> Result<CacheHandle, OCRError> {
        let cascade = RecognitionCascade::new(recognizers, policy)?;
        Ok(Arc::new(Self { detector, cascade }))
    }

    /// The layout detector.
    pub fn detector(&self) -> &dyn LayoutDetector {
        self.detector.as_ref()
    }

    /// The recognition cascade.
    pub fn cascade(&self) -> &RecognitionCascade {
        &self.cascade
    }
}

/// A slot that can be initialized exactly once.
#[derive(Debug, Default)]
pub struct ModelCell {
    cell: OnceLock<CacheHandle>,
}

impl ModelCell {
    /// Creates an empty cell.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Loads the bundle into the cell. A second call is an error.
    pub fn initialize(
        &self,
        bundle: &ModelBundleConfig,
        ort: &OrtSessionConfig,
        policy: &ParallelPolicy,
    ) -> Result<CacheHandle, OCRError> {
        if self.cell.get().is_some() {
            return Err(Self::already_initialized());
        }
        let handle = ModelCache::initialize(bundle, ort, policy)?;
        self.set(handle)
    }

    /// Stores an existing cache. Fails if the cell is already filled.
    pub fn set(&self, handle: CacheHandle) -> Result<CacheHandle, OCRError> {
        self.cell
            .set(Arc::clone(&handle))
            .map_err(|_| Self::already_initialized())?;
        Ok(handle)
    }

    /// The cached handle, if initialized.
    pub fn get(&self) -> Option<CacheHandle> {
        self.cell.get().cloned()
    }

    fn already_initialized() -> OCRError {
        OCRError::config_error_detailed("model cache", "already initialized")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{LayoutDetection, Recognition};
    use image::RgbImage;

    struct NoDetections;

    impl LayoutDetector for NoDetections {
        fn name(&self) -> &str {
            "none"
        }

        fn detect(&self, _image: &RgbImage) -> Result<Vec<LayoutDetection>, OCRError> {
            Ok(Vec::new())
        }
    }

    struct Echo(usize);

    impl TextRecognizer for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn capacity(&self) -> usize {
            self.0
        }

        fn recognize(&self, _line: &RgbImage) -> Result<Recognition, OCRError> {
            Ok(Recognition::default())
        }
    }

    fn cache() -> CacheHandle {
        ModelCache::from_parts(
            Box::new(NoDetections),
            vec![Box::new(Echo(30)), Box::new(Echo(50)), Box::new(Echo(100))],
            &ParallelPolicy::default(),
        )
        .expect("cache")
    }

    #[test]
    fn test_cell_initializes_once() {
        let cell = ModelCell::new();
        assert!(cell.get().is_none());

        let first = cell.set(cache()).expect("first set");
        let again = cell.get().expect("cached");
        assert!(Arc::ptr_eq(&first, &again));

        let err = cell.set(cache()).expect_err("second set");
        assert!(err.to_string().contains("already initialized"));
        let err = cell
            .initialize(
                &ModelBundleConfig::from_root("does-not-exist"),
                &OrtSessionConfig::default(),
                &ParallelPolicy::default(),
            )
            .expect_err("second initialize");
        assert!(err.to_string().contains("already initialized"));
    }

    #[test]
    fn test_missing_bundle_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ModelCache::initialize(
            &ModelBundleConfig::from_root(dir.path()),
            &OrtSessionConfig::default(),
            &ParallelPolicy::default(),
        )
        .expect_err("empty bundle");
        assert!(matches!(err, OCRError::ModelLoad { .. }));
    }

    #[test]
    fn test_from_parts_exposes_tiers() {
        let cache = cache();
        assert_eq!(cache.cascade().capacities(), vec![30, 50, 100]);
        assert_eq!(cache.detector().name(), "none");
    }
}
