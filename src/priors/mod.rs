//! Population dose-response priors.
//!
//! Two sources, merged by the orchestrator (never here):
//!
//! - a bundled local dataset (`local`) — always available, the floor
//! - a remote client (`remote`) — higher-fidelity priors for a curated
//!   allow-list of markers, fetched at most once per request fingerprint

pub mod local;
pub mod remote;

pub use local::*;
pub use remote::*;

use crate::domain::{FitPolicy, RegressionFit, canonical_marker};

/// Markers for which population priors are known to be reliable.
///
/// This bounds both the cost and the relevance of every remote call: a
/// marker outside this list never triggers a fetch no matter how sparse
/// its personal data is.
pub fn default_allowlist() -> Vec<String> {
    [
        "total testosterone",
        "free testosterone",
        "estradiol",
        "hematocrit",
        "shbg",
        "igf-1",
        "hdl",
    ]
    .iter()
    .map(|m| m.to_string())
    .collect()
}

/// The eligibility gate for requesting a remote prior: the personal fit
/// must be too weak for a personal prediction *and* the marker must be on
/// the curated allow-list.
pub fn is_remote_candidate(fit: &RegressionFit, policy: &FitPolicy, allowlist: &[String]) -> bool {
    if !fit.is_ineligible(policy) {
        return false;
    }
    let canonical = canonical_marker(&fit.marker);
    allowlist.iter().any(|m| canonical_marker(m) == canonical)
}
