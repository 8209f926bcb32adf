//! Location of the model bundle on disk.
//!
//! A bundle is a directory with two children:
//!
//! ```text
//! <root>/
//!   model/    deim-s-1024x1024.onnx and the three parseq-*.onnx files
//!   config/   NDLmoji.yaml (character set) and ndl.yaml (class map)
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the bundle root explicitly.
pub const MODEL_DIR_ENV: &str = "OAR_MODEL_DIR";
/// Environment variable naming a mounted layer that may contain the bundle.
pub const LAYER_DIR_ENV: &str = "LAMBDA_LAYER_DIR";

const DEFAULT_ROOT: &str = "models";

/// One recognizer tier: the model file and the number of characters it can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizerModelConfig {
    /// Model file name, relative to `<root>/model` unless absolute.
    pub file: PathBuf,
    /// Maximum characters the model can output.
    pub capacity: usize,
}

/// Paths of every file the model cache loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundleConfig {
    /// Bundle root directory.
    pub root: PathBuf,
    /// Layout detector file, relative to `<root>/model` unless absolute.
    pub detector: PathBuf,
    /// Recognizer tiers, ordered by capacity.
    pub recognizers: Vec<RecognizerModelConfig>,
    /// Character set file, relative to `<root>/config` unless absolute.
    pub charset: PathBuf,
    /// Detector class map, relative to `<root>/config` unless absolute.
    pub class_map: PathBuf,
}

impl ModelBundleConfig {
    /// Bundle rooted at `root` with the default file names.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            detector: PathBuf::from("deim-s-1024x1024.onnx"),
            recognizers: vec![
                RecognizerModelConfig {
                    file: PathBuf::from("parseq-ndl-16x256-30-tiny-192epoch-tegaki3.onnx"),
                    capacity: 30,
                },
                RecognizerModelConfig {
                    file: PathBuf::from("parseq-ndl-16x384-50-tiny-146epoch-tegaki2.onnx"),
                    capacity: 50,
                },
                RecognizerModelConfig {
                    file: PathBuf::from("parseq-ndl-16x768-100-tiny-165epoch-tegaki2.onnx"),
                    capacity: 100,
                },
            ],
            charset: PathBuf::from("NDLmoji.yaml"),
            class_map: PathBuf::from("ndl.yaml"),
        }
    }

    /// Resolves the bundle root from the environment.
    ///
    /// Order: `OAR_MODEL_DIR`, then `LAMBDA_LAYER_DIR` if it holds a `model/`
    /// directory, then `./models`.
    pub fn from_env() -> Self {
        Self::from_root(Self::resolve_root(
            std::env::var_os(MODEL_DIR_ENV).map(PathBuf::from),
            std::env::var_os(LAYER_DIR_ENV).map(PathBuf::from),
        ))
    }

    fn resolve_root(explicit: Option<PathBuf>, layer: Option<PathBuf>) -> PathBuf {
        if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
            return dir;
        }
        if let Some(dir) = layer.filter(|d| d.join("model").is_dir()) {
            return dir;
        }
        PathBuf::from(DEFAULT_ROOT)
    }

    /// Directory holding the ONNX files.
    pub fn model_dir(&self) -> PathBuf {
        self.root.join("model")
    }

    /// Directory holding the YAML resources.
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Absolute or root-relative path of the detector.
    pub fn detector_path(&self) -> PathBuf {
        join_unless_absolute(&self.model_dir(), &self.detector)
    }

    /// Path of a recognizer tier.
    pub fn recognizer_path(&self, tier: &RecognizerModelConfig) -> PathBuf {
        join_unless_absolute(&self.model_dir(), &tier.file)
    }

    /// Path of the character set file.
    pub fn charset_path(&self) -> PathBuf {
        join_unless_absolute(&self.config_dir(), &self.charset)
    }

    /// Path of the class map file.
    pub fn class_map_path(&self) -> PathBuf {
        join_unless_absolute(&self.config_dir(), &self.class_map)
    }
}

fn join_unless_absolute(base: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base.join(file)
    }
}
