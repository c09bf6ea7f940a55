//! The enrichment orchestrator.
//!
//! Stateful coordinator around the prior store and the blending engine for
//! a whole prediction set:
//!
//! - fingerprint the current situation (`fingerprint`)
//! - reuse cached merged priors per fingerprint (`cache`)
//! - enforce daily/monthly remote-usage caps (`quota`)
//! - abandon superseded computations cooperatively (`cancel`)
//! - drive fit → prior resolution → blend → projection (`orchestrator`)

pub mod cache;
pub mod cancel;
pub mod fingerprint;
pub mod orchestrator;
pub mod quota;

pub use cache::*;
pub use cancel::*;
pub use fingerprint::*;
pub use orchestrator::*;
pub use quota::*;
