//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and blending
//! - handed across the host boundary (UI, persistence) as JSON
//! - replayed later in tests to audit how an estimate was produced

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Unit system the host is currently displaying in.
///
/// Priors are keyed per unit system because the same marker has different
/// slopes/intercepts in e.g. nmol/L vs ng/dL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    Eu,
    Us,
}

/// When a blood sample was drawn relative to the injection schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingTiming {
    /// Immediately before the next injection (lowest point of the cycle).
    Trough,
    /// Shortly after an injection (highest point of the cycle).
    Peak,
    /// Somewhere in between.
    Mid,
    /// Not recorded.
    Unspecified,
}

/// Which observation subset a fit was ultimately computed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Trough-only subset (preferred: comparable points).
    Trough,
    /// Full mixed-timing set (fallback when trough-only is too sparse).
    All,
}

/// Fit quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitStatus {
    /// Enough data and a slope distinguishable from zero.
    Clear,
    /// Too few samples or too few distinct dose levels to fit.
    Insufficient,
    /// The fitted slope is statistically indistinguishable from zero
    /// over the observed dose range.
    Flat,
}

/// One time-stamped lab measurement at a known weekly dose.
///
/// Immutable input owned by the observation store; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub marker: String,
    pub date: NaiveDate,
    pub dose_mg_per_week: f64,
    pub value: f64,
    pub unit: String,
    pub sampling_timing: SamplingTiming,
}

impl Observation {
    /// Boundary validation: non-finite or negative-dose inputs are rejected
    /// before they can reach the fitter, never silently coerced into a fit.
    pub fn validate(&self) -> Result<(), String> {
        if !self.dose_mg_per_week.is_finite() {
            return Err(format!("dose {} is not finite", self.dose_mg_per_week));
        }
        if self.dose_mg_per_week < 0.0 {
            return Err(format!("dose {} is negative", self.dose_mg_per_week));
        }
        if !self.value.is_finite() {
            return Err(format!("value {} is not finite", self.value));
        }
        if self.marker.trim().is_empty() {
            return Err("marker name is empty".to_string());
        }
        Ok(())
    }
}

/// An observation the fitter decided not to use, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedPoint {
    pub date: NaiveDate,
    pub reason: String,
}

/// A personal dose→value regression for one marker.
///
/// Created fresh on every recomputation as a pure function of the observation
/// set; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub marker: String,
    pub unit: String,
    pub slope_per_mg: f64,
    pub intercept: f64,
    pub sample_count: usize,
    pub unique_dose_levels: usize,
    /// Pearson correlation; `None` with fewer than 2 distinct dose levels.
    pub correlation_r: Option<f64>,
    pub r_squared: f64,
    /// Fit method tag for downstream diagnostics (e.g. `"linear-ols"`).
    pub model_type: String,
    pub status: FitStatus,
    pub status_reason: Option<String>,
    pub sampling_mode: SamplingMode,
    pub sampling_warning: Option<String>,
    pub excluded_points: Vec<ExcludedPoint>,
    pub used_observation_dates: Vec<NaiveDate>,
    /// Observation counts before timing filtering, carried for the request
    /// fingerprint.
    pub trough_sample_count: usize,
    pub all_sample_count: usize,
    /// Observed dose range of the retained points.
    pub dose_min: f64,
    pub dose_max: f64,
    /// Dose of the most recent retained observation.
    pub current_dose: f64,
    /// Residual standard deviation around the fitted line.
    pub residual_std: f64,
}

impl RegressionFit {
    /// Whether this fit is too weak to support any personal prediction
    /// (the remote-enrichment eligibility gate, together with the allow-list).
    pub fn is_ineligible(&self, policy: &FitPolicy) -> bool {
        self.status == FitStatus::Insufficient
            || self.sample_count < policy.min_samples
            || self.unique_dose_levels < policy.min_dose_levels
    }

    /// Whether this fit is strong enough to stand on its own with no prior.
    pub fn is_fully_eligible(&self, policy: &FitPolicy) -> bool {
        self.status == FitStatus::Clear
            && self.sample_count >= policy.full_samples
            && self.unique_dose_levels >= policy.full_dose_levels
    }
}

/// Where a population prior came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorProvenance {
    Local,
    Remote,
}

/// A population-level dose-response prior for one marker/unit combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosePrior {
    pub marker: String,
    pub unit: String,
    pub unit_system: UnitSystem,
    pub slope: f64,
    pub intercept: f64,
    pub sigma_prior: f64,
    pub provenance: PriorProvenance,
}

impl DosePrior {
    pub fn key(&self) -> PriorKey {
        PriorKey::new(&self.marker, self.unit_system, &self.unit)
    }
}

/// Lookup key for the active prior set: canonical marker + unit system + unit.
///
/// At most one prior per key is active after merging; remote overrides local
/// on collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriorKey {
    pub marker: String,
    pub unit_system: UnitSystem,
    pub unit: String,
}

impl PriorKey {
    pub fn new(marker: &str, unit_system: UnitSystem, unit: &str) -> Self {
        Self {
            marker: canonical_marker(marker),
            unit_system,
            unit: unit.trim().to_ascii_lowercase(),
        }
    }
}

/// Canonical marker spelling used for prior lookup, allow-list membership,
/// and observation grouping: trimmed, lowercased, inner whitespace collapsed.
pub fn canonical_marker(marker: &str) -> String {
    marker
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// What ultimately determined a prediction's coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    /// Personal fit only; no prior contributed weight.
    Personal,
    /// Inverse-variance blend of personal fit and prior.
    Hybrid,
    /// Personal fit ineligible; the prior fully determines the estimate.
    StudyPrior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Audit trail of how a hybrid/prior estimate was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendDiagnostics {
    /// Personal weight in `[0, 1]`; `w_prior = 1 - w_personal`.
    pub w_personal: f64,
    pub sigma_personal: f64,
    pub sigma_prior: f64,
    pub sigma_residual: f64,
    /// Whether the contributing prior came from the bundled dataset because
    /// the remote source was unavailable or over quota.
    pub offline_prior_fallback: bool,
}

/// The externally visible per-marker result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosePrediction {
    pub marker: String,
    pub unit: String,
    pub current_dose: f64,
    /// Model value at the current dose, clamped at zero.
    pub current_estimate: f64,
    pub source: PredictionSource,
    pub confidence: Confidence,
    pub slope_per_mg: f64,
    pub intercept: f64,
    /// Confidence band at the current dose; `None` when no uncertainty
    /// estimate exists (no residual spread and no prior).
    pub predicted_band: Option<(f64, f64)>,
    /// Present iff a prior contributed weight to this prediction.
    pub blend: Option<BlendDiagnostics>,
    pub status_reason: Option<String>,
    pub sampling_warning: Option<String>,
    pub excluded_points: Vec<ExcludedPoint>,
    pub sample_count: usize,
    pub unique_dose_levels: usize,
    pub correlation_r: Option<f64>,
    pub r_squared: f64,
    pub model_type: String,
    /// Observed dose range of the underlying fit, used by the projection
    /// query's extrapolation penalty.
    pub dose_min: f64,
    pub dose_max: f64,
    /// Residual scale of the blended model (basis of the confidence band).
    pub sigma_residual: f64,
}

/// One projected scenario: estimate plus confidence band at a target dose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub estimate: f64,
    pub low: f64,
    pub high: f64,
}

/// A whole recomputation's output plus the observability fields the host
/// renders alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    pub predictions: Vec<DosePrediction>,
    /// True only while a remote fetch for the current generation is in
    /// flight; always false on a completed synchronous computation.
    pub loading: bool,
    /// True when remote enrichment was wanted but the bundled dataset had to
    /// stand in (network failure or quota).
    pub offline_prior_fallback: bool,
    /// Human-readable reason when the usage quota blocked a remote fetch.
    pub limit_reason: Option<String>,
    /// Remote fetches still available today.
    pub remaining_assisted: u32,
    /// Markers in this set that actually received a remote prior.
    pub api_assisted_count: u32,
    /// True when this computation was superseded mid-flight; the result must
    /// not be published and no shared state was committed for it.
    pub stale: bool,
}

/// Thresholds for fit classification and eligibility.
///
/// These are policy constants, not estimates: see DESIGN.md for the chosen
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitPolicy {
    /// Below this sample count a fit is `insufficient`.
    pub min_samples: usize,
    /// Below this many distinct dose levels a fit is `insufficient`.
    pub min_dose_levels: usize,
    /// At or above these counts (with a clear status) a fit stands alone.
    pub full_samples: usize,
    pub full_dose_levels: usize,
    /// Flat test: predicted change across the observed dose range must
    /// exceed `flat_band ×` residual std to count as a real slope.
    pub flat_band: f64,
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self {
            min_samples: 3,
            min_dose_levels: 2,
            full_samples: 5,
            full_dose_levels: 3,
            flat_band: 1.0,
        }
    }
}

/// Constants of the inverse-variance blend and confidence tiering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendPolicy {
    /// Floor for residual/prior sigmas so precisions stay finite.
    pub sigma_floor: f64,
    /// `High` confidence requires this R² or near-total personal weight.
    pub high_r_squared: f64,
    pub high_w_personal: f64,
    /// Below this personal weight the prediction leans on the prior enough
    /// to be `Low` confidence.
    pub low_w_personal: f64,
}

impl Default for BlendPolicy {
    fn default() -> Self {
        Self {
            sigma_floor: 1e-6,
            high_r_squared: 0.8,
            high_w_personal: 0.9,
            low_w_personal: 0.5,
        }
    }
}

/// Constants of the projection band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionPolicy {
    /// z-multiplier of the residual band (1.645 ≈ 90% two-sided).
    pub band_z: f64,
    /// Linear widening rate per span-normalized extrapolation distance.
    pub widen_rate: f64,
    /// Floor on the observed dose span (mg/week) so the normalization is
    /// stable for single-dose fits.
    pub min_span_mg: f64,
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        Self {
            band_z: 1.645,
            widen_rate: 0.5,
            min_span_mg: 1.0,
        }
    }
}

/// Remote enrichment usage caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub daily_cap: u32,
    pub monthly_cap: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_cap: 3,
            monthly_cap: 30,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fit: FitPolicy,
    pub blend: BlendPolicy,
    pub projection: ProjectionPolicy,
    pub quota: QuotaPolicy,
    /// Bounded size of the enrichment fingerprint cache.
    pub cache_capacity: u64,
    /// Curated markers for which remote priors are known to be reliable.
    pub assisted_allowlist: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fit: FitPolicy::default(),
            blend: BlendPolicy::default(),
            projection: ProjectionPolicy::default(),
            quota: QuotaPolicy::default(),
            cache_capacity: 32,
            assisted_allowlist: crate::priors::default_allowlist(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(dose: f64, value: f64) -> Observation {
        Observation {
            marker: "Total Testosterone".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
            dose_mg_per_week: dose,
            value,
            unit: "nmol/L".to_string(),
            sampling_timing: SamplingTiming::Trough,
        }
    }

    #[test]
    fn validate_rejects_negative_dose_and_non_finite_values() {
        assert!(obs(100.0, 21.0).validate().is_ok());
        assert!(obs(-1.0, 21.0).validate().is_err());
        assert!(obs(f64::NAN, 21.0).validate().is_err());
        assert!(obs(100.0, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn canonical_marker_collapses_case_and_whitespace() {
        assert_eq!(canonical_marker("  Total   Testosterone "), "total testosterone");
        assert_eq!(
            PriorKey::new("Total Testosterone", UnitSystem::Eu, " nmol/L "),
            PriorKey::new("total testosterone", UnitSystem::Eu, "nmol/l"),
        );
    }
}
