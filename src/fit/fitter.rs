//! The personal regression fitter.
//!
//! Given all observations for one marker we:
//!
//! - select the sampling-timing subset (`sampling`)
//! - fit `value = intercept + slope * dose` by least squares
//! - compute Pearson r / R² / residual spread
//! - classify the fit as `clear`, `insufficient`, or `flat`
//!
//! The fitter is a pure function of its inputs: identical observation sets
//! always produce identical fits, which downstream fingerprinting and
//! caching rely on.

use crate::domain::{FitPolicy, FitStatus, Observation, RegressionFit, SamplingMode};
use crate::fit::sampling::select_sampling_subset;
use crate::math::{fit_line, pearson_r, r_squared, residual_std, sample_std, unique_dose_levels};

pub const MODEL_LINEAR_OLS: &str = "linear-ols";

/// Fit one marker's observation set.
///
/// Inputs are assumed validated at the engine boundary (finite values,
/// non-negative doses). An empty set yields an `insufficient` placeholder
/// fit so callers never have to special-case missing markers.
pub fn fit_marker(marker: &str, observations: &[Observation], policy: &FitPolicy) -> RegressionFit {
    let split = select_sampling_subset(observations, policy.min_samples);

    // Sort retained points by date so "current dose" and the used-dates list
    // are deterministic regardless of input order.
    let mut used = split.used;
    used.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| {
        a.dose_mg_per_week
            .partial_cmp(&b.dose_mg_per_week)
            .unwrap_or(std::cmp::Ordering::Equal)
    }));

    let doses: Vec<f64> = used.iter().map(|o| o.dose_mg_per_week).collect();
    let values: Vec<f64> = used.iter().map(|o| o.value).collect();
    let n = used.len();
    let levels = unique_dose_levels(&doses);

    let unit = used
        .last()
        .map(|o| o.unit.clone())
        .unwrap_or_default();
    let current_dose = used.last().map(|o| o.dose_mg_per_week).unwrap_or(0.0);
    let dose_min = doses.iter().copied().fold(f64::INFINITY, f64::min);
    let dose_max = doses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (dose_min, dose_max) = if n == 0 { (0.0, 0.0) } else { (dose_min, dose_max) };

    // A single effective dose level cannot identify a slope even when the
    // raw doses differ by rounding noise.
    let line = if levels >= 2 { fit_line(&doses, &values) } else { None };

    let (intercept, slope, resid_std, r2) = match line {
        Some(line) => {
            let resid = residual_std(&doses, &values, line.intercept, line.slope);
            let r2 = r_squared(&doses, &values, line.intercept, line.slope);
            (line.intercept, line.slope, resid, r2)
        }
        None => {
            // No identifiable slope: a level model at the mean value. The
            // sample spread stands in for the residual spread.
            let mean = if n > 0 { values.iter().sum::<f64>() / n as f64 } else { 0.0 };
            (mean, 0.0, sample_std(&values), 0.0)
        }
    };

    let correlation_r = pearson_r(&doses, &values);

    let (status, status_reason) = classify(n, levels, slope, resid_std, dose_max - dose_min, policy);

    RegressionFit {
        marker: marker.to_string(),
        unit,
        slope_per_mg: slope,
        intercept,
        sample_count: n,
        unique_dose_levels: levels,
        correlation_r,
        r_squared: r2,
        model_type: MODEL_LINEAR_OLS.to_string(),
        status,
        status_reason,
        sampling_mode: if n == 0 { SamplingMode::All } else { split.mode },
        sampling_warning: split.warning,
        excluded_points: split.excluded,
        used_observation_dates: used.iter().map(|o| o.date).collect(),
        trough_sample_count: split.trough_count,
        all_sample_count: split.all_count,
        dose_min,
        dose_max,
        current_dose,
        residual_std: resid_std,
    }
}

fn classify(
    n: usize,
    levels: usize,
    slope: f64,
    resid_std: f64,
    dose_span: f64,
    policy: &FitPolicy,
) -> (FitStatus, Option<String>) {
    if n < policy.min_samples {
        return (
            FitStatus::Insufficient,
            Some(format!("only {n} usable samples; need {}", policy.min_samples)),
        );
    }
    if levels < policy.min_dose_levels {
        return (
            FitStatus::Insufficient,
            Some(format!(
                "only {levels} distinct dose levels; need {}",
                policy.min_dose_levels
            )),
        );
    }

    // Flat test: the fitted change across the observed dose range must rise
    // above the residual noise band to count as a real slope.
    let predicted_change = slope.abs() * dose_span;
    if predicted_change <= policy.flat_band * resid_std {
        return (
            FitStatus::Flat,
            Some("fitted slope indistinguishable from zero over observed doses".to_string()),
        );
    }

    (FitStatus::Clear, None)
}
