//! Sampling-timing subset selection.
//!
//! Trough draws are the comparable ones: a peak measured two days after an
//! injection is not on the same curve as a trough measured right before one.
//! We therefore prefer fitting on the trough-only subset and fall back to
//! the full mixed set (with a warning) only when trough-only is too sparse.

use crate::domain::{ExcludedPoint, Observation, SamplingMode, SamplingTiming};

/// Outcome of subset selection for one marker.
#[derive(Debug, Clone)]
pub struct SamplingSplit {
    /// Observations the fit will actually use.
    pub used: Vec<Observation>,
    /// Observations dropped for timing reasons, with human-readable reasons.
    pub excluded: Vec<ExcludedPoint>,
    pub mode: SamplingMode,
    pub warning: Option<String>,
    /// Counts before filtering, carried into the request fingerprint.
    pub trough_count: usize,
    pub all_count: usize,
}

/// Select the observation subset to fit on.
///
/// Prefers the trough-only subset when it keeps at least `min_samples`
/// points; otherwise uses the full set and flags the timing mix.
pub fn select_sampling_subset(observations: &[Observation], min_samples: usize) -> SamplingSplit {
    let all_count = observations.len();
    let trough_count = observations
        .iter()
        .filter(|o| o.sampling_timing == SamplingTiming::Trough)
        .count();

    let mixed = observations
        .iter()
        .any(|o| o.sampling_timing != SamplingTiming::Trough);

    if trough_count >= min_samples.max(1) && mixed {
        let mut used = Vec::with_capacity(trough_count);
        let mut excluded = Vec::new();
        for o in observations {
            if o.sampling_timing == SamplingTiming::Trough {
                used.push(o.clone());
            } else {
                excluded.push(ExcludedPoint {
                    date: o.date,
                    reason: "different sampling timing".to_string(),
                });
            }
        }
        return SamplingSplit {
            used,
            excluded,
            mode: SamplingMode::Trough,
            warning: None,
            trough_count,
            all_count,
        };
    }

    // Either everything is trough-timed already, or trough-only would be too
    // sparse to fit. Use the full set; warn only when timings are mixed.
    let warning = if mixed {
        Some("mixed sampling timing: too few trough samples, using all observations".to_string())
    } else {
        None
    };
    let mode = if mixed { SamplingMode::All } else { SamplingMode::Trough };

    SamplingSplit {
        used: observations.to_vec(),
        excluded: Vec::new(),
        mode,
        warning,
        trough_count,
        all_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(day: u32, timing: SamplingTiming) -> Observation {
        Observation {
            marker: "estradiol".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            dose_mg_per_week: 100.0,
            value: 30.0,
            unit: "pg/ml".to_string(),
            sampling_timing: timing,
        }
    }

    #[test]
    fn prefers_trough_subset_when_it_is_large_enough() {
        let observations = vec![
            obs(1, SamplingTiming::Trough),
            obs(2, SamplingTiming::Trough),
            obs(3, SamplingTiming::Trough),
            obs(4, SamplingTiming::Peak),
        ];
        let split = select_sampling_subset(&observations, 3);
        assert_eq!(split.mode, SamplingMode::Trough);
        assert_eq!(split.used.len(), 3);
        assert_eq!(split.excluded.len(), 1);
        assert_eq!(split.excluded[0].reason, "different sampling timing");
        assert!(split.warning.is_none());
        assert_eq!(split.trough_count, 3);
        assert_eq!(split.all_count, 4);
    }

    #[test]
    fn falls_back_to_all_with_warning_when_trough_is_sparse() {
        let observations = vec![
            obs(1, SamplingTiming::Trough),
            obs(2, SamplingTiming::Peak),
            obs(3, SamplingTiming::Mid),
        ];
        let split = select_sampling_subset(&observations, 3);
        assert_eq!(split.mode, SamplingMode::All);
        assert_eq!(split.used.len(), 3);
        assert!(split.excluded.is_empty());
        assert!(split.warning.is_some());
    }

    #[test]
    fn uniform_trough_set_has_no_warning_and_no_exclusions() {
        let observations = vec![obs(1, SamplingTiming::Trough), obs(2, SamplingTiming::Trough)];
        let split = select_sampling_subset(&observations, 3);
        assert_eq!(split.mode, SamplingMode::Trough);
        assert!(split.warning.is_none());
        assert!(split.excluded.is_empty());
    }
}
