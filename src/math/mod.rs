//! Numerics: the least-squares line fit and summary statistics.

pub mod ols;
pub mod stats;

pub use ols::*;
pub use stats::*;
