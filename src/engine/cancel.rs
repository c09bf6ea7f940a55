//! Cooperative cancellation of superseded recomputations.
//!
//! Each `compute_predictions` invocation claims a fresh generation number;
//! starting a newer invocation makes every older token stale. A token is
//! checked before *committing* anything (cache write, quota charge, result
//! publication) — the in-flight fetch itself is abandoned, not torn down at
//! the network layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
pub struct CancelToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl CancelToken {
    pub(crate) fn new(current: Arc<AtomicU64>, generation: u64) -> Self {
        Self {
            current,
            generation,
        }
    }

    /// True once a newer invocation has claimed the engine.
    pub fn is_cancelled(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }
}
