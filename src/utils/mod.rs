//! Utility functions for the OCR pipeline.
//!
//! Cropping helpers and logging setup.

pub mod bbox_crop;

pub use bbox_crop::BBoxCrop;

/// Installs the global `tracing` subscriber.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Calling it again is a
/// no-op.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
