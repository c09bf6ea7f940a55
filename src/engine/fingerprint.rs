//! Request fingerprinting.
//!
//! A fingerprint is a value derived deterministically from everything that
//! matters to a remote enrichment request: unit system, the sorted candidate
//! marker list, and a coarse per-candidate fit summary. It is the cache and
//! quota key, so the granularity is intentionally coarse: two fits that are
//! statistically indistinguishable at this resolution must collide.

use crate::domain::{RegressionFit, UnitSystem, canonical_marker};

/// Rounded per-candidate summary.
///
/// Floats are carried as scaled integers so the whole fingerprint is
/// `Hash + Eq`: correlation to two decimals, dose to 0.1 mg/week.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateSummary {
    pub marker: String,
    pub sample_count: usize,
    pub unique_dose_levels: usize,
    /// Pearson r × 100, rounded; `None` mirrors the fit's missing r.
    pub correlation_centi: Option<i64>,
    /// Current dose × 10, rounded.
    pub current_dose_deci: i64,
    pub trough_sample_count: usize,
    pub all_sample_count: usize,
}

impl CandidateSummary {
    fn from_fit(fit: &RegressionFit) -> Self {
        Self {
            marker: canonical_marker(&fit.marker),
            sample_count: fit.sample_count,
            unique_dose_levels: fit.unique_dose_levels,
            correlation_centi: fit.correlation_r.map(|r| (r * 100.0).round() as i64),
            current_dose_deci: (fit.current_dose * 10.0).round() as i64,
            trough_sample_count: fit.trough_sample_count,
            all_sample_count: fit.all_sample_count,
        }
    }
}

/// The deterministic cache/quota key for one enrichment situation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint {
    pub unit_system: UnitSystem,
    /// Sorted by canonical marker name.
    pub candidates: Vec<CandidateSummary>,
}

impl RequestFingerprint {
    /// Build from the candidate fits of one recomputation.
    pub fn new(unit_system: UnitSystem, candidate_fits: &[&RegressionFit]) -> Self {
        let mut candidates: Vec<CandidateSummary> = candidate_fits
            .iter()
            .map(|fit| CandidateSummary::from_fit(fit))
            .collect();
        candidates.sort_by(|a, b| a.marker.cmp(&b.marker));
        Self {
            unit_system,
            candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStatus, SamplingMode};

    fn fit(marker: &str, r: Option<f64>, dose: f64) -> RegressionFit {
        RegressionFit {
            marker: marker.to_string(),
            unit: "nmol/l".to_string(),
            slope_per_mg: 0.1,
            intercept: 1.0,
            sample_count: 2,
            unique_dose_levels: 2,
            correlation_r: r,
            r_squared: 0.4,
            model_type: "linear-ols".to_string(),
            status: FitStatus::Insufficient,
            status_reason: None,
            sampling_mode: SamplingMode::Trough,
            sampling_warning: None,
            excluded_points: Vec::new(),
            used_observation_dates: Vec::new(),
            trough_sample_count: 2,
            all_sample_count: 2,
            dose_min: dose,
            dose_max: dose,
            current_dose: dose,
            residual_std: 0.5,
        }
    }

    #[test]
    fn candidate_order_does_not_change_the_fingerprint() {
        let a = fit("shbg", Some(0.5), 100.0);
        let b = fit("estradiol", Some(0.7), 100.0);
        let fp1 = RequestFingerprint::new(UnitSystem::Eu, &[&a, &b]);
        let fp2 = RequestFingerprint::new(UnitSystem::Eu, &[&b, &a]);
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn statistically_indistinguishable_fits_collide() {
        // Correlation differing past the 2nd decimal, dose past 0.1 mg.
        let a = fit("shbg", Some(0.701), 100.02);
        let b = fit("shbg", Some(0.699), 99.98);
        let fp1 = RequestFingerprint::new(UnitSystem::Eu, &[&a]);
        let fp2 = RequestFingerprint::new(UnitSystem::Eu, &[&b]);
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn unit_system_and_counts_distinguish_fingerprints() {
        let a = fit("shbg", Some(0.7), 100.0);
        let fp_eu = RequestFingerprint::new(UnitSystem::Eu, &[&a]);
        let fp_us = RequestFingerprint::new(UnitSystem::Us, &[&a]);
        assert_ne!(fp_eu, fp_us);

        let mut more = fit("shbg", Some(0.7), 100.0);
        more.sample_count = 3;
        let fp_more = RequestFingerprint::new(UnitSystem::Eu, &[&more]);
        assert_ne!(fp_eu, fp_more);
    }
}
