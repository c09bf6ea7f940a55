//! The prediction engine: fits, prior resolution, blending, projection.
//!
//! One `compute_predictions` call is one recomputation of the whole set.
//! The remote prior fetch is the only operation that may take time; its
//! result is committed only if the invocation is still current, so a
//! superseded recomputation can never poison the cache or the quota.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::blend::blend_prediction;
use crate::domain::{
    DosePrior, EngineConfig, Observation, PredictionSet, PriorKey, Projection, RegressionFit,
    UnitSystem, canonical_marker,
};
use crate::engine::cache::{EnrichmentCache, EnrichmentCacheEntry};
use crate::engine::cancel::CancelToken;
use crate::engine::fingerprint::RequestFingerprint;
use crate::engine::quota::QuotaState;
use crate::error::EngineError;
use crate::fit::fit_marker;
use crate::priors::{
    FitSummary, PriorRequest, RemotePriorSource, is_remote_candidate, local_priors,
};
use crate::project;

pub struct PredictionEngine<R: RemotePriorSource> {
    config: EngineConfig,
    remote: R,
    cache: EnrichmentCache,
    /// Fingerprints already charged against the quota. Separate from the
    /// cache so an evicted entry can be refetched without a second charge.
    charged: Mutex<HashSet<RequestFingerprint>>,
    quota: Mutex<QuotaState>,
    /// Current invocation generation; older tokens become stale when this
    /// moves.
    generation: Arc<AtomicU64>,
}

/// Outcome of prior resolution for one recomputation.
struct PriorResolution {
    priors: HashMap<PriorKey, DosePrior>,
    assisted_markers: Vec<String>,
    offline_fallback: bool,
    limit_reason: Option<String>,
    stale: bool,
}

impl<R: RemotePriorSource + Sync> PredictionEngine<R> {
    pub fn new(config: EngineConfig, remote: R, quota: QuotaState) -> Self {
        let cache = EnrichmentCache::new(config.cache_capacity);
        Self {
            config,
            remote,
            cache,
            charged: Mutex::new(HashSet::new()),
            quota: Mutex::new(quota),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the quota counters for the host to persist.
    pub fn quota_state(&self) -> QuotaState {
        self.quota.lock().expect("quota lock").clone()
    }

    /// Drop all enrichment state (cache and charged-fingerprint set).
    /// Intended for tests; quota counters are left alone.
    pub fn reset_enrichment(&self) {
        self.cache.reset();
        self.charged.lock().expect("charged lock").clear();
    }

    /// Recompute the full prediction set.
    ///
    /// Every failure of the enrichment path degrades to the bundled priors;
    /// the only `Err` cases are invalid observations at the boundary.
    pub fn compute_predictions(
        &self,
        observations: &[Observation],
        unit_system: UnitSystem,
        enrichment_enabled: bool,
    ) -> Result<PredictionSet, EngineError> {
        for obs in observations {
            obs.validate().map_err(|reason| EngineError::InvalidObservation {
                marker: obs.marker.clone(),
                date: obs.date,
                reason,
            })?;
        }

        // Claim a fresh generation; any older in-flight invocation is now
        // forbidden from committing.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancelToken::new(Arc::clone(&self.generation), generation);

        // Group by canonical marker (BTreeMap for deterministic output order)
        // and fit each marker independently.
        let mut groups: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            groups
                .entry(canonical_marker(&obs.marker))
                .or_default()
                .push(obs.clone());
        }
        let groups: Vec<(String, Vec<Observation>)> = groups.into_iter().collect();
        let fits: Vec<RegressionFit> = groups
            .par_iter()
            .map(|(marker, group)| fit_marker(marker, group, &self.config.fit))
            .collect();

        let candidates: Vec<&RegressionFit> = fits
            .iter()
            .filter(|fit| {
                is_remote_candidate(fit, &self.config.fit, &self.config.assisted_allowlist)
            })
            .collect();

        let resolution =
            self.resolve_priors(unit_system, &candidates, enrichment_enabled, &token);

        let predictions = fits
            .iter()
            .map(|fit| {
                let key = PriorKey::new(&fit.marker, unit_system, &fit.unit);
                let prior = resolution.priors.get(&key);
                let mut prediction = blend_prediction(
                    fit,
                    prior,
                    resolution.offline_fallback,
                    &self.config.fit,
                    &self.config.blend,
                );
                if prediction.sigma_residual > 0.0 {
                    prediction.predicted_band = project::project(
                        &prediction,
                        prediction.current_dose,
                        &self.config.projection,
                    )
                    .ok()
                    .map(|p| (p.low, p.high));
                }
                prediction
            })
            .collect();

        let remaining_assisted = {
            let quota = self.quota.lock().expect("quota lock");
            quota.remaining_daily(&self.config.quota)
        };

        Ok(PredictionSet {
            predictions,
            loading: false,
            offline_prior_fallback: resolution.offline_fallback,
            limit_reason: resolution.limit_reason,
            remaining_assisted,
            api_assisted_count: resolution.assisted_markers.len() as u32,
            stale: resolution.stale,
        })
    }

    /// Project one prediction to an arbitrary scenario dose using the
    /// engine's projection policy.
    pub fn project(
        &self,
        prediction: &crate::domain::DosePrediction,
        target_dose: f64,
    ) -> Result<Projection, EngineError> {
        project::project(prediction, target_dose, &self.config.projection)
    }

    fn resolve_priors(
        &self,
        unit_system: UnitSystem,
        candidates: &[&RegressionFit],
        enrichment_enabled: bool,
        token: &CancelToken,
    ) -> PriorResolution {
        let local = local_priors(unit_system);

        // Disabled, or nothing worth asking about: local priors only, and
        // that is not a fallback — it is the intended path.
        if !enrichment_enabled || candidates.is_empty() {
            return PriorResolution {
                priors: local,
                assisted_markers: Vec::new(),
                offline_fallback: false,
                limit_reason: None,
                stale: false,
            };
        }

        let fingerprint = RequestFingerprint::new(unit_system, candidates);

        if let Some(entry) = self.cache.get(&fingerprint) {
            debug!(
                candidates = candidates.len(),
                "enrichment cache hit; replaying merged priors"
            );
            return PriorResolution {
                priors: entry.merged_priors,
                assisted_markers: entry.assisted_markers,
                offline_fallback: entry.offline_fallback,
                limit_reason: None,
                stale: false,
            };
        }

        {
            let mut quota = self.quota.lock().expect("quota lock");
            quota.rollover(Utc::now());
            if !quota.can_spend(&self.config.quota) {
                let reason = quota.limit_reason(&self.config.quota);
                info!(reason = reason.as_deref(), "enrichment quota exhausted; using local priors");
                return PriorResolution {
                    priors: local,
                    assisted_markers: Vec::new(),
                    offline_fallback: true,
                    limit_reason: reason,
                    stale: false,
                };
            }
        }

        let mut candidate_markers: Vec<String> = candidates
            .iter()
            .map(|fit| canonical_marker(&fit.marker))
            .collect();
        candidate_markers.sort();
        let request = PriorRequest {
            unit_system,
            candidate_markers: candidate_markers.clone(),
            fit_summaries: candidates.iter().map(|fit| FitSummary::from_fit(fit)).collect(),
        };

        debug!(candidates = candidate_markers.len(), "issuing remote prior fetch");
        match self.remote.fetch_priors(&request) {
            Ok(remote_priors) => {
                let mut merged = local;
                let mut assisted: Vec<String> = Vec::new();
                for prior in remote_priors {
                    let marker = canonical_marker(&prior.marker);
                    if candidate_markers.contains(&marker) && !assisted.contains(&marker) {
                        assisted.push(marker);
                    }
                    // Remote wins on key collision.
                    merged.insert(prior.key(), prior);
                }
                assisted.sort();

                if token.is_cancelled() {
                    debug!("fetch superseded; discarding result without committing");
                    return PriorResolution {
                        priors: merged,
                        assisted_markers: assisted,
                        offline_fallback: false,
                        limit_reason: None,
                        stale: true,
                    };
                }

                // Charge the quota exactly once per fingerprint, ever.
                let newly_charged = self
                    .charged
                    .lock()
                    .expect("charged lock")
                    .insert(fingerprint.clone());
                if newly_charged {
                    self.quota.lock().expect("quota lock").record();
                }

                self.cache.insert(
                    fingerprint,
                    EnrichmentCacheEntry {
                        merged_priors: merged.clone(),
                        assisted_markers: assisted.clone(),
                        offline_fallback: false,
                    },
                );

                info!(assisted = assisted.len(), "remote priors merged");
                PriorResolution {
                    priors: merged,
                    assisted_markers: assisted,
                    offline_fallback: false,
                    limit_reason: None,
                    stale: false,
                }
            }
            Err(err) => {
                // Normal outcome: degrade to the bundled dataset. The failure
                // is not cached and not charged, so the next recomputation
                // with this fingerprint may retry.
                warn!(error = %err, "prior fetch failed; falling back to local priors");
                PriorResolution {
                    priors: local,
                    assisted_markers: Vec::new(),
                    offline_fallback: true,
                    limit_reason: None,
                    stale: token.is_cancelled(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Confidence, FitStatus, PredictionSource, PriorProvenance, SamplingTiming,
    };
    use crate::error::FetchError;
    use chrono::NaiveDate;
    use std::sync::atomic::AtomicUsize;

    // Scripted remote source. A shared inner handle lets tests observe call
    // counts and simulate a superseding invocation mid-fetch.
    struct FakeRemoteInner {
        calls: AtomicUsize,
        response: Mutex<Result<Vec<DosePrior>, FetchError>>,
        /// When set, the fetch bumps this generation counter before
        /// returning, as if the inputs changed while the request was in
        /// flight.
        supersede: Mutex<Option<Arc<AtomicU64>>>,
    }

    #[derive(Clone)]
    struct FakeRemote(Arc<FakeRemoteInner>);

    impl FakeRemote {
        fn succeeding(priors: Vec<DosePrior>) -> Self {
            Self(Arc::new(FakeRemoteInner {
                calls: AtomicUsize::new(0),
                response: Mutex::new(Ok(priors)),
                supersede: Mutex::new(None),
            }))
        }

        fn failing(err: FetchError) -> Self {
            Self(Arc::new(FakeRemoteInner {
                calls: AtomicUsize::new(0),
                response: Mutex::new(Err(err)),
                supersede: Mutex::new(None),
            }))
        }

        fn calls(&self) -> usize {
            self.0.calls.load(Ordering::SeqCst)
        }
    }

    impl RemotePriorSource for FakeRemote {
        fn fetch_priors(&self, _request: &PriorRequest) -> Result<Vec<DosePrior>, FetchError> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(generation) = self.0.supersede.lock().unwrap().as_ref() {
                generation.fetch_add(1, Ordering::SeqCst);
            }
            self.0.response.lock().unwrap().clone()
        }
    }

    fn obs(marker: &str, day: u32, dose: f64, value: f64) -> Observation {
        Observation {
            marker: marker.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            dose_mg_per_week: dose,
            value,
            unit: "nmol/L".to_string(),
            sampling_timing: SamplingTiming::Trough,
        }
    }

    fn remote_shbg_prior() -> DosePrior {
        DosePrior {
            marker: "shbg".to_string(),
            unit: "nmol/l".to_string(),
            unit_system: UnitSystem::Eu,
            slope: 0.5,
            intercept: 20.0,
            sigma_prior: 4.0,
            provenance: PriorProvenance::Remote,
        }
    }

    fn engine_with(remote: FakeRemote) -> PredictionEngine<FakeRemote> {
        PredictionEngine::new(EngineConfig::default(), remote, QuotaState::new(Utc::now()))
    }

    /// 6 personal samples across 3 dose levels on a clean line.
    fn clean_tt_series() -> Vec<Observation> {
        vec![
            obs("total testosterone", 1, 100.0, 21.0),
            obs("total testosterone", 8, 100.0, 21.4),
            obs("total testosterone", 15, 125.0, 26.1),
            obs("total testosterone", 16, 125.0, 25.8),
            obs("total testosterone", 22, 150.0, 31.2),
            obs("total testosterone", 23, 150.0, 30.9),
        ]
    }

    #[test]
    fn scenario_a_clean_personal_fit_never_fetches() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        let set = engine
            .compute_predictions(&clean_tt_series(), UnitSystem::Eu, true)
            .unwrap();

        assert_eq!(set.predictions.len(), 1);
        let pred = &set.predictions[0];
        assert_eq!(pred.source, PredictionSource::Personal);
        assert_eq!(pred.confidence, Confidence::High);
        assert!(pred.blend.is_none());
        assert!(pred.predicted_band.is_some());

        // Allow-listed marker, but the fit is eligible: no fetch at all.
        assert_eq!(remote.calls(), 0);
        assert!(!set.offline_prior_fallback);
        assert_eq!(set.api_assisted_count, 0);
        assert!(!set.stale);
    }

    #[test]
    fn scenario_b_sparse_marker_gets_a_remote_prior_and_one_charge() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        let set = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        let pred = &set.predictions[0];
        assert_eq!(pred.source, PredictionSource::StudyPrior);
        // The remote prior (slope 0.5) beat the bundled one (slope -0.08).
        assert_eq!(pred.slope_per_mg, 0.5);
        assert!(!pred.blend.as_ref().unwrap().offline_prior_fallback);

        assert_eq!(remote.calls(), 1);
        assert_eq!(set.api_assisted_count, 1);
        assert_eq!(engine.quota_state().daily_count, 1);
        assert!(!set.offline_prior_fallback);
    }

    #[test]
    fn scenario_c_fetch_timeout_falls_back_to_local_without_charging() {
        let remote = FakeRemote::failing(FetchError::Timeout);
        let engine = engine_with(remote.clone());

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        let set = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        assert!(set.offline_prior_fallback);
        assert_eq!(set.api_assisted_count, 0);
        assert_eq!(engine.quota_state().daily_count, 0);

        // Estimate computed from the bundled dataset.
        let pred = &set.predictions[0];
        assert_eq!(pred.source, PredictionSource::StudyPrior);
        assert_eq!(pred.slope_per_mg, -0.08);
        assert!(pred.blend.as_ref().unwrap().offline_prior_fallback);

        // Failures are not cached: the same fingerprint retries.
        engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();
        assert_eq!(remote.calls(), 2);
    }

    #[test]
    fn scenario_d_exhausted_quota_blocks_the_fetch_entirely() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let mut quota = QuotaState::new(Utc::now());
        for _ in 0..EngineConfig::default().quota.daily_cap {
            quota.record();
        }
        let engine = PredictionEngine::new(EngineConfig::default(), remote.clone(), quota);

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        let set = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        assert_eq!(remote.calls(), 0);
        assert!(set.offline_prior_fallback);
        assert!(set.limit_reason.as_deref().unwrap().contains("daily"));
        assert_eq!(set.remaining_assisted, 0);
        assert_eq!(set.predictions[0].slope_per_mg, -0.08);
    }

    #[test]
    fn identical_fingerprints_fetch_and_charge_exactly_once() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        let first = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();
        let second = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        assert_eq!(remote.calls(), 1);
        assert_eq!(engine.quota_state().daily_count, 1);
        assert_eq!(first.predictions, second.predictions);
        assert_eq!(second.api_assisted_count, 1);
    }

    #[test]
    fn changed_inputs_produce_a_new_fingerprint_and_a_new_fetch() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        // A second sample at a new dose changes the fit summary.
        let mut more = observations.clone();
        more.push(obs("shbg", 8, 125.0, 34.0));
        engine
            .compute_predictions(&more, UnitSystem::Eu, true)
            .unwrap();

        assert_eq!(remote.calls(), 2);
        assert_eq!(engine.quota_state().daily_count, 2);
    }

    #[test]
    fn superseded_fetch_commits_nothing() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        // The fetch itself advances the generation, as if the observation
        // set changed while the request was in flight.
        remote
            .0
            .supersede
            .lock()
            .unwrap()
            .replace(Arc::clone(&engine.generation));

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        let set = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        assert!(set.stale);
        assert_eq!(engine.quota_state().daily_count, 0);

        // Nothing was cached for the fingerprint: a fresh computation
        // fetches again (and this time commits).
        remote.0.supersede.lock().unwrap().take();
        let fresh = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();
        assert!(!fresh.stale);
        assert_eq!(remote.calls(), 2);
        assert_eq!(engine.quota_state().daily_count, 1);
    }

    #[test]
    fn disabled_enrichment_still_blends_with_local_priors() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        let set = engine
            .compute_predictions(&observations, UnitSystem::Eu, false)
            .unwrap();

        assert_eq!(remote.calls(), 0);
        assert!(!set.offline_prior_fallback);
        let pred = &set.predictions[0];
        assert_eq!(pred.source, PredictionSource::StudyPrior);
        assert_eq!(pred.slope_per_mg, -0.08);
    }

    #[test]
    fn off_list_marker_with_sparse_data_stays_personal_without_a_fetch() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        // "prolactin" is not on the allow-list and has no bundled prior.
        let observations = vec![obs("prolactin", 1, 100.0, 200.0)];
        let set = engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        assert_eq!(remote.calls(), 0);
        let pred = &set.predictions[0];
        assert_eq!(pred.source, PredictionSource::Personal);
        assert_eq!(pred.confidence, Confidence::Low);
        assert!(pred.status_reason.is_some());
    }

    #[test]
    fn invalid_observations_are_rejected_at_the_boundary() {
        let engine = engine_with(FakeRemote::succeeding(Vec::new()));
        let bad = vec![obs("shbg", 1, -5.0, 30.0)];
        let err = engine
            .compute_predictions(&bad, UnitSystem::Eu, true)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidObservation { .. }));
    }

    #[test]
    fn empty_input_yields_an_empty_set() {
        let engine = engine_with(FakeRemote::succeeding(Vec::new()));
        let set = engine
            .compute_predictions(&[], UnitSystem::Eu, true)
            .unwrap();
        assert!(set.predictions.is_empty());
        assert!(!set.offline_prior_fallback);
        assert!(set.limit_reason.is_none());
    }

    #[test]
    fn reset_enrichment_clears_cache_and_charge_tracking() {
        let remote = FakeRemote::succeeding(vec![remote_shbg_prior()]);
        let engine = engine_with(remote.clone());

        let observations = vec![obs("shbg", 1, 100.0, 30.0)];
        engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();
        assert_eq!(engine.quota_state().daily_count, 1);

        engine.reset_enrichment();
        engine
            .compute_predictions(&observations, UnitSystem::Eu, true)
            .unwrap();

        // Cache was cleared, so the fetch repeats; the charged set was also
        // cleared, so this counts as a fresh charge.
        assert_eq!(remote.calls(), 2);
        assert_eq!(engine.quota_state().daily_count, 2);
    }

    #[test]
    fn projection_through_the_engine_uses_the_configured_policy() {
        let remote = FakeRemote::succeeding(Vec::new());
        let engine = engine_with(remote);

        let set = engine
            .compute_predictions(&clean_tt_series(), UnitSystem::Eu, true)
            .unwrap();
        let pred = &set.predictions[0];

        let at_current = engine.project(pred, pred.current_dose).unwrap();
        let beyond = engine.project(pred, pred.dose_max + 100.0).unwrap();
        assert!(at_current.estimate >= 0.0);
        assert!(beyond.high - beyond.estimate > at_current.high - at_current.estimate);
    }
}
