use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::analysis::ProductAnalysis;
use crate::pipeline::AnalysisOutcome;

pub use crate::analysis::AnalysisRequest;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResponse {
    pub analysis: ProductAnalysis,
    /// Safer alternatives; not produced yet, always empty.
    pub alternatives: Vec<ProductAnalysis>,
    pub cached: bool,
    pub url_hash: String,
    /// Age of a cached result in seconds, `null` for fresh analyses.
    pub cache_age_seconds: Option<i64>,
}

impl From<AnalysisOutcome> for AnalysisResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            url_hash: outcome.analysis.url_hash.clone(),
            analysis: outcome.analysis,
            alternatives: Vec::new(),
            cached: outcome.cached,
            cache_age_seconds: outcome.cache_age_seconds,
        }
    }
}
