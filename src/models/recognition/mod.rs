//! Text recognition models.

pub mod parseq;

pub use parseq::{Charset, ParseqModel, ParseqModelBuilder};
