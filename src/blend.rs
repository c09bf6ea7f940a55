//! Bayesian blending of a personal fit with a population prior.
//!
//! The handoff is deliberately smooth: with little personal data the prior
//! dominates; as samples accumulate the personal precision `1/σ²` grows and
//! `w_personal → 1`, converging to a purely personal fit. The blend itself
//! is inverse-variance (precision) weighting of the line coefficients.

use crate::domain::{
    BlendDiagnostics, BlendPolicy, Confidence, DosePrediction, DosePrior, FitPolicy, FitStatus,
    PredictionSource, RegressionFit,
};

/// Combine one personal fit with its matching prior (if any) into the
/// externally visible prediction.
///
/// `offline_prior_fallback` records whether the prior set in play came from
/// the bundled dataset because the remote source was unavailable; it is
/// carried verbatim into the diagnostics.
pub fn blend_prediction(
    fit: &RegressionFit,
    prior: Option<&DosePrior>,
    offline_prior_fallback: bool,
    fit_policy: &FitPolicy,
    policy: &BlendPolicy,
) -> DosePrediction {
    let (source, slope, intercept, sigma_residual, blend) = match prior {
        // No prior, or a fit strong enough to stand alone: purely personal.
        None => personal(fit),
        Some(_) if fit.is_fully_eligible(fit_policy) => personal(fit),

        // Fit too weak to contribute: the prior determines the estimate.
        Some(p) if fit.is_ineligible(fit_policy) => {
            let diag = BlendDiagnostics {
                w_personal: 0.0,
                sigma_personal: personal_sigma(fit, policy),
                sigma_prior: p.sigma_prior,
                sigma_residual: p.sigma_prior,
                offline_prior_fallback,
            };
            (
                PredictionSource::StudyPrior,
                p.slope,
                p.intercept,
                p.sigma_prior,
                Some(diag),
            )
        }

        // Usable but weak fit: precision-weighted blend.
        Some(p) => {
            let sigma_personal = personal_sigma(fit, policy);
            let sigma_prior = p.sigma_prior.max(policy.sigma_floor);

            let precision_personal = 1.0 / (sigma_personal * sigma_personal);
            let precision_prior = 1.0 / (sigma_prior * sigma_prior);
            let w = precision_personal / (precision_personal + precision_prior);

            let slope = w * fit.slope_per_mg + (1.0 - w) * p.slope;
            let intercept = w * fit.intercept + (1.0 - w) * p.intercept;

            // Residual scale of the mixture: weighted combination of the
            // personal residual spread and the prior's sigma.
            let sigma_residual = (w * fit.residual_std * fit.residual_std
                + (1.0 - w) * p.sigma_prior * p.sigma_prior)
                .sqrt();

            let diag = BlendDiagnostics {
                w_personal: w,
                sigma_personal,
                sigma_prior,
                sigma_residual,
                offline_prior_fallback,
            };
            (PredictionSource::Hybrid, slope, intercept, sigma_residual, Some(diag))
        }
    };

    let current_estimate = (intercept + slope * fit.current_dose).max(0.0);
    let confidence = confidence_tier(fit, source, blend.as_ref().map(|d| d.w_personal), fit_policy, policy);

    DosePrediction {
        marker: fit.marker.clone(),
        unit: fit.unit.clone(),
        current_dose: fit.current_dose,
        current_estimate,
        source,
        confidence,
        slope_per_mg: slope,
        intercept,
        predicted_band: None, // filled by the orchestrator via the projection query
        blend,
        status_reason: fit.status_reason.clone(),
        sampling_warning: fit.sampling_warning.clone(),
        excluded_points: fit.excluded_points.clone(),
        sample_count: fit.sample_count,
        unique_dose_levels: fit.unique_dose_levels,
        correlation_r: fit.correlation_r,
        r_squared: fit.r_squared,
        model_type: fit.model_type.clone(),
        dose_min: fit.dose_min,
        dose_max: fit.dose_max,
        sigma_residual,
    }
}

fn personal(
    fit: &RegressionFit,
) -> (PredictionSource, f64, f64, f64, Option<BlendDiagnostics>) {
    (
        PredictionSource::Personal,
        fit.slope_per_mg,
        fit.intercept,
        fit.residual_std,
        None,
    )
}

/// Uncertainty of the personal line: residual spread shrinks with sample
/// count (standard-error style), floored so precisions stay finite.
fn personal_sigma(fit: &RegressionFit, policy: &BlendPolicy) -> f64 {
    let n = fit.sample_count.max(1) as f64;
    (fit.residual_std.max(policy.sigma_floor) / n.sqrt()).max(policy.sigma_floor)
}

fn confidence_tier(
    fit: &RegressionFit,
    source: PredictionSource,
    w_personal: Option<f64>,
    fit_policy: &FitPolicy,
    policy: &BlendPolicy,
) -> Confidence {
    let heavy_prior_reliance = source == PredictionSource::StudyPrior
        || w_personal.is_some_and(|w| w < policy.low_w_personal);
    if fit.status != FitStatus::Clear || heavy_prior_reliance {
        return Confidence::Low;
    }

    let ample = fit.sample_count >= fit_policy.full_samples
        && fit.unique_dose_levels >= fit_policy.full_dose_levels;
    let clean = fit.r_squared >= policy.high_r_squared;
    let negligible_prior = w_personal.is_none_or(|w| w >= policy.high_w_personal);

    if ample && (clean || negligible_prior) {
        Confidence::High
    } else {
        Confidence::Medium
    }
}
