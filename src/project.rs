//! The dose projection query.
//!
//! Stateless and side-effect-free: given a finished prediction and any
//! hypothetical weekly dose, return a point estimate and a confidence band.
//! Callable any number of times against the same prediction.

use crate::domain::{DosePrediction, Projection, ProjectionPolicy};
use crate::error::EngineError;

/// Project a prediction to an arbitrary target dose.
///
/// The estimate is the model line clamped at zero. The band is the blended
/// residual band, widened linearly with the distance from the observed dose
/// range (extrapolation penalty): at zero distance it collapses to the
/// fit's baseline uncertainty, and it never narrows as the distance grows.
pub fn project(
    prediction: &DosePrediction,
    target_dose: f64,
    policy: &ProjectionPolicy,
) -> Result<Projection, EngineError> {
    if !target_dose.is_finite() || target_dose < 0.0 {
        return Err(EngineError::InvalidTargetDose(target_dose));
    }

    let estimate = (prediction.intercept + prediction.slope_per_mg * target_dose).max(0.0);

    let distance = if target_dose < prediction.dose_min {
        prediction.dose_min - target_dose
    } else if target_dose > prediction.dose_max {
        target_dose - prediction.dose_max
    } else {
        0.0
    };

    let span = (prediction.dose_max - prediction.dose_min).max(policy.min_span_mg);
    let sigma = prediction.sigma_residual * (1.0 + policy.widen_rate * distance / span);
    let half_band = policy.band_z * sigma;

    Ok(Projection {
        estimate,
        low: (estimate - half_band).max(0.0),
        high: estimate + half_band,
    })
}
