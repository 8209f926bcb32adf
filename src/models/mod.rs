//! Model implementations.
//!
//! Each model owns its pre- and post-processing and implements one of the
//! traits in [`crate::core::traits`].

pub mod detection;
pub mod recognition;
