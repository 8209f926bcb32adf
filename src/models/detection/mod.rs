//! Layout detection models.

pub mod deim;

pub use deim::{ClassMap, DeimModel, DeimModelBuilder, DeimPostprocessConfig};
