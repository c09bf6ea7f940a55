//! Error taxonomy.
//!
//! Two deliberately separate types:
//!
//! - [`EngineError`] — boundary failures a caller can see (invalid input,
//!   misconfiguration). Data insufficiency is *not* an error; it is a fit
//!   status, so a sparse marker still yields a prediction object.
//! - [`FetchError`] — remote prior fetch failures. These are a normal,
//!   expected outcome of the enrichment path and are absorbed by the
//!   orchestrator (offline fallback); they never escape
//!   `compute_predictions`.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("invalid observation for '{marker}' on {date}: {reason}")]
    InvalidObservation {
        marker: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("invalid target dose {0} (must be finite and non-negative)")]
    InvalidTargetDose(f64),

    #[error("missing {0} in environment (.env)")]
    MissingEnv(&'static str),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Failure of a single remote prior fetch.
///
/// Timeouts, transport errors, non-2xx statuses, and unparseable bodies all
/// mean the same thing to the orchestrator: use local priors for this
/// recomputation and let a later one retry.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("prior request timed out")]
    Timeout,

    #[error("prior request failed: {0}")]
    Transport(String),

    #[error("prior request returned status {0}")]
    Status(u16),

    #[error("malformed prior response: {0}")]
    Malformed(String),
}
