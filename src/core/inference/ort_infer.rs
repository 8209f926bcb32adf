//! Pooled ONNX Runtime sessions.
//!
//! `ort` needs `&mut Session` to run a model, so each model is held as a small
//! pool of mutex-guarded sessions and calls rotate over the pool.

use crate::core::config::OrtSessionConfig;
use crate::core::errors::{OCRError, SimpleError};
use ort::session::Session;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[path = "ort_infer_config.rs"]
mod ort_infer_config;

/// A loaded ONNX model.
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("sessions", &self.sessions.len())
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Loads `model_path` into `cfg.pool_size()` sessions configured by `cfg`.
    pub fn from_config(
        cfg: &OrtSessionConfig,
        model_path: impl AsRef<Path>,
    ) -> Result<Self, OCRError> {
        let path = model_path.as_ref();
        if !path.is_file() {
            return Err(OCRError::model_load_error(
                path,
                "file not found",
                Some("check the model directory (--model-dir or OAR_MODEL_DIR)"),
                None::<SimpleError>,
            ));
        }

        let pool_size = cfg.pool_size();
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let builder = Self::apply_ort_config(Session::builder()?, cfg)?;
            let session = builder.commit_from_file(path).map_err(|e| {
                OCRError::model_load_error(
                    path,
                    "failed to create ONNX session",
                    Some("check device/EP configuration and model file"),
                    Some(e),
                )
            })?;
            sessions.push(Mutex::new(session));
        }

        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    /// Returns the model path associated with this inference engine.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Names of the model outputs, in declaration order.
    pub fn output_names(&self) -> Result<Vec<String>, OCRError> {
        self.with_session(|session| Ok(session.outputs.iter().map(|o| o.name.clone()).collect()))
    }

    /// Runs `f` with exclusive access to one session of the pool.
    pub fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, OCRError>,
    ) -> Result<T, OCRError> {
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx].lock().map_err(|_| {
            OCRError::inference_error(
                &self.model_name,
                format!(
                    "failed to acquire session lock for session {}/{}",
                    idx,
                    self.sessions.len()
                ),
                SimpleError::new("session lock poisoned"),
            )
        })?;
        f(&mut session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_model_load_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = OrtInfer::from_config(&OrtSessionConfig::default(), dir.path().join("nope.onnx"))
            .expect_err("missing file must fail");
        match err {
            OCRError::ModelLoad { reason, .. } => assert_eq!(reason, "file not found"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
