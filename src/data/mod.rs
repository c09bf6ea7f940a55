//! Input generation helpers.
//!
//! Synthetic observation series for demos and tests (`sample`). Real
//! observations come from the host's observation store.

pub mod sample;

pub use sample::*;
