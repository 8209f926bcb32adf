//! Image and geometry processing shared by the models and the page processor.

pub mod geometry;
pub mod normalization;
pub mod sorting;

pub use geometry::{BoundingBox, Point};
pub use normalization::NormalizeImage;
pub use sorting::{ReadingFlow, reading_order};
