//! Bundled local prior dataset.
//!
//! A small versioned table of population dose-response lines, one row per
//! (marker, unit system). Zero latency, always available; the remote source
//! overlays it when enrichment succeeds.
//!
//! Coefficients are deliberately conservative population-level figures with
//! wide sigmas: they exist to anchor sparse personal data, not to outweigh
//! a decent personal fit.

use std::collections::HashMap;

use crate::domain::{DosePrior, PriorKey, PriorProvenance, UnitSystem};

pub const LOCAL_PRIOR_DATASET_VERSION: &str = "2025.2";

/// (marker, eu unit, eu slope, eu intercept, eu sigma,
///          us unit, us slope, us intercept, us sigma)
type Row = (
    &'static str,
    &'static str,
    f64,
    f64,
    f64,
    &'static str,
    f64,
    f64,
    f64,
);

// Dose axis is mg/week of injected testosterone ester throughout.
const ROWS: &[Row] = &[
    ("total testosterone", "nmol/l", 0.23, 1.7, 5.2, "ng/dl", 6.5, 50.0, 150.0),
    ("free testosterone", "nmol/l", 0.004, 0.17, 0.10, "pg/ml", 0.12, 5.0, 3.0),
    ("estradiol", "pmol/l", 0.92, 18.0, 29.0, "pg/ml", 0.25, 5.0, 8.0),
    ("hematocrit", "%", 0.02, 44.0, 2.5, "%", 0.02, 44.0, 2.5),
    ("shbg", "nmol/l", -0.08, 32.0, 8.0, "nmol/l", -0.08, 32.0, 8.0),
    ("igf-1", "µg/l", 0.15, 160.0, 40.0, "ng/ml", 0.15, 160.0, 40.0),
    ("hdl", "mmol/l", -0.0013, 1.34, 0.23, "mg/dl", -0.05, 52.0, 9.0),
];

/// The bundled priors for one unit system, keyed for merging.
pub fn local_priors(unit_system: UnitSystem) -> HashMap<PriorKey, DosePrior> {
    let mut out = HashMap::with_capacity(ROWS.len());
    for row in ROWS {
        let (marker, eu_unit, eu_slope, eu_icept, eu_sigma, us_unit, us_slope, us_icept, us_sigma) =
            *row;
        let (unit, slope, intercept, sigma) = match unit_system {
            UnitSystem::Eu => (eu_unit, eu_slope, eu_icept, eu_sigma),
            UnitSystem::Us => (us_unit, us_slope, us_icept, us_sigma),
        };
        let prior = DosePrior {
            marker: marker.to_string(),
            unit: unit.to_string(),
            unit_system,
            slope,
            intercept,
            sigma_prior: sigma,
            provenance: PriorProvenance::Local,
        };
        out.insert(prior.key(), prior);
    }
    out
}
