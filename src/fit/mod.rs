//! Personal regression fitting.
//!
//! Responsibilities:
//!
//! - pick the sampling-timing subset to fit on (`sampling`)
//! - fit the dose→value line and classify the result (`fitter`)

pub mod fitter;
pub mod sampling;

pub use fitter::*;
pub use sampling::*;
