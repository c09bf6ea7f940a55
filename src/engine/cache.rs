//! Enrichment result cache.
//!
//! Keyed by [`RequestFingerprint`]; a hit replays the merged prior set
//! verbatim, which is what guarantees at most one remote fetch per distinct
//! situation across repeated recomputations. Explicitly owned by the engine
//! with a bounded capacity and a `reset` for tests, rather than living in
//! implicit module-level state.
//!
//! Only successful fetches are cached: a failed fetch must stay retryable
//! under the same fingerprint.

use std::collections::HashMap;

use crate::domain::{DosePrior, PriorKey};
use crate::engine::fingerprint::RequestFingerprint;

/// The merged outcome of one successful (or deliberately local) resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentCacheEntry {
    /// Local priors overlaid with any remote ones (remote wins per key).
    pub merged_priors: HashMap<PriorKey, DosePrior>,
    /// Candidate markers that actually received a remote prior.
    pub assisted_markers: Vec<String>,
    /// Whether this entry was produced without the remote source.
    pub offline_fallback: bool,
}

/// Bounded fingerprint → entry cache.
pub struct EnrichmentCache {
    inner: moka::sync::Cache<RequestFingerprint, EnrichmentCacheEntry>,
}

impl EnrichmentCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: moka::sync::Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn get(&self, fingerprint: &RequestFingerprint) -> Option<EnrichmentCacheEntry> {
        self.inner.get(fingerprint)
    }

    pub fn insert(&self, fingerprint: RequestFingerprint, entry: EnrichmentCacheEntry) {
        self.inner.insert(fingerprint, entry);
    }

    /// Drop everything (test hook; production entries live until evicted).
    pub fn reset(&self) {
        self.inner.invalidate_all();
    }

    pub fn contains(&self, fingerprint: &RequestFingerprint) -> bool {
        self.inner.contains_key(fingerprint)
    }
}
