use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

pub const MAX_URL_LENGTH: usize = 2048;

/// A request to analyze one product listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisRequest {
    /// Product listing URL, http or https.
    #[schema(example = "https://www.amazon.com/dp/B000000000")]
    pub product_url: String,
    /// Skip the cache lookup; the fresh result still replaces the cached entry.
    #[serde(default)]
    pub force_refresh: bool,
    /// Allergens the analysis should pay special attention to.
    #[serde(default)]
    pub allergen_profile: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(product_url: impl Into<String>) -> Self {
        Self {
            product_url: product_url.into(),
            force_refresh: false,
            allergen_profile: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = self.product_url.trim();
        if url.is_empty() {
            return Err("product_url must not be empty".to_string());
        }
        if self.product_url.len() > MAX_URL_LENGTH {
            return Err(format!("product_url exceeds {MAX_URL_LENGTH} bytes"));
        }
        let parsed = Url::parse(url).map_err(|e| format!("product_url is not a valid URL: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme: {}", parsed.scheme()));
        }
        if parsed.host_str().is_none() {
            return Err("product_url has no host".to_string());
        }
        Ok(())
    }
}
