//! `dose-curves` — a personal dose-response prediction engine.
//!
//! For each tracked biomarker the engine:
//!
//! - fits a personal dose→value line from lab observations (`fit`)
//! - blends that fit with a population prior when personal data is weak
//!   (`priors`, `blend`)
//! - decides when to spend a rate-limited remote enrichment call for
//!   higher-fidelity priors, with a fingerprint cache, a usage quota, and
//!   cooperative cancellation (`engine`)
//! - projects any hypothetical dose to an estimate plus an uncertainty
//!   band (`project`)
//!
//! The host (charts, forms, persistence) is a separate concern: this crate
//! only consumes observation lists and produces prediction objects.

pub mod blend;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fit;
pub mod math;
pub mod priors;
pub mod project;

pub use domain::{
    Confidence, DosePrediction, DosePrior, EngineConfig, Observation, PredictionSet,
    PredictionSource, Projection, RegressionFit, UnitSystem,
};
pub use engine::{PredictionEngine, QuotaState};
pub use error::{EngineError, FetchError};
pub use priors::{HttpPriorClient, RemotePriorSource};
pub use project::project;
