//! Remote prior enrichment client.
//!
//! One network call per non-cached fingerprint: the request batches every
//! candidate marker with an anonymized summary of its personal fit, and the
//! response carries zero or more higher-fidelity priors. Failure of any
//! kind (timeout, non-2xx, malformed body) is a normal outcome surfaced as
//! [`FetchError`]; the orchestrator degrades to the bundled dataset.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DosePrior, PriorProvenance, RegressionFit, UnitSystem};
use crate::error::{EngineError, FetchError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Anonymized personal-fit summary sent per candidate marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub marker: String,
    pub sample_count: usize,
    pub unique_dose_levels: usize,
    pub correlation_r: Option<f64>,
    pub current_dose: f64,
}

impl FitSummary {
    pub fn from_fit(fit: &RegressionFit) -> Self {
        Self {
            marker: crate::domain::canonical_marker(&fit.marker),
            sample_count: fit.sample_count,
            unique_dose_levels: fit.unique_dose_levels,
            correlation_r: fit.correlation_r,
            current_dose: fit.current_dose,
        }
    }
}

/// The enrichment request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRequest {
    pub unit_system: UnitSystem,
    pub candidate_markers: Vec<String>,
    pub fit_summaries: Vec<FitSummary>,
}

/// Seam between the orchestrator and the network.
///
/// Production uses [`HttpPriorClient`]; tests substitute scripted sources
/// to exercise the failure, quota, and cancellation paths.
pub trait RemotePriorSource {
    fn fetch_priors(&self, request: &PriorRequest) -> Result<Vec<DosePrior>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct PriorResponse {
    priors: Vec<PriorRow>,
}

#[derive(Debug, Deserialize)]
struct PriorRow {
    marker: String,
    unit: String,
    slope: f64,
    intercept: f64,
    sigma_prior: f64,
}

/// Blocking HTTP implementation with a hard request timeout.
pub struct HttpPriorClient {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl HttpPriorClient {
    /// Build from the environment (`.env` supported):
    /// `DOSE_PRIORS_API_URL` and `DOSE_PRIORS_API_KEY`.
    pub fn from_env() -> Result<Self, EngineError> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("DOSE_PRIORS_API_URL")
            .map_err(|_| EngineError::MissingEnv("DOSE_PRIORS_API_URL"))?;
        let api_key = std::env::var("DOSE_PRIORS_API_KEY")
            .map_err(|_| EngineError::MissingEnv("DOSE_PRIORS_API_KEY"))?;
        Self::new(base_url, api_key)
    }

    pub fn new(base_url: String, api_key: String) -> Result<Self, EngineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::ClientBuild(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

impl RemotePriorSource for HttpPriorClient {
    fn fetch_priors(&self, request: &PriorRequest) -> Result<Vec<DosePrior>, FetchError> {
        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: PriorResponse = resp
            .json()
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        Ok(sanitize_rows(body.priors, request.unit_system))
    }
}

/// Keep only rows a blend can safely consume; a partially bad response is
/// still useful for its good rows.
fn sanitize_rows(rows: Vec<PriorRow>, unit_system: UnitSystem) -> Vec<DosePrior> {
    rows.into_iter()
        .filter(|r| {
            r.slope.is_finite()
                && r.intercept.is_finite()
                && r.sigma_prior.is_finite()
                && r.sigma_prior > 0.0
                && !r.marker.trim().is_empty()
        })
        .map(|r| DosePrior {
            marker: r.marker,
            unit: r.unit,
            unit_system,
            slope: r.slope,
            intercept: r.intercept,
            sigma_prior: r.sigma_prior,
            provenance: PriorProvenance::Remote,
        })
        .collect()
}
