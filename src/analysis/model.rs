use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::scoring::RiskLevel;

/// Product text pulled from a retailer page by a scraper.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedProduct {
    pub url: String,
    pub retailer: String,
    /// Title, brand, ingredient/material fragments and description, newline separated.
    pub raw_text: String,
    pub confidence: f64,
    pub scraper: &'static str,
}

/// Structured product record produced by the extraction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedProduct {
    pub product_name: String,
    pub brand: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub ingredients: Vec<String>,
    pub materials: Vec<String>,
    pub features: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[serde(alias = "medium")]
    Moderate,
    #[serde(alias = "severe")]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ToxicityLevel {
    Low,
    #[serde(alias = "moderate")]
    Medium,
    #[serde(alias = "severe")]
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DetectedAllergen {
    pub name: String,
    pub severity: Severity,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DetectedPfas {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub body_effects: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DetectedConcern {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(alias = "severity")]
    pub toxicity_level: ToxicityLevel,
    #[serde(default)]
    pub description: String,
}

/// Detected-hazard payload returned by the analysis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HazardReport {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub product_category: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    pub allergens_detected: Vec<DetectedAllergen>,
    pub pfas_detected: Vec<DetectedPfas>,
    pub other_concerns: Vec<DetectedConcern>,
    pub confidence: f64,
}

impl HazardReport {
    pub fn detection_count(&self) -> usize {
        self.allergens_detected.len() + self.pfas_detected.len() + self.other_concerns.len()
    }
}

/// Completed analysis as returned to callers and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductAnalysis {
    pub product_url: String,
    pub url_hash: String,
    pub product_name: String,
    pub brand: String,
    pub retailer: Option<String>,
    pub category: Option<String>,
    pub ingredients: Vec<String>,
    pub allergens_detected: Vec<DetectedAllergen>,
    pub pfas_detected: Vec<DetectedPfas>,
    pub other_concerns: Vec<DetectedConcern>,
    /// 0-100, higher is more hazardous.
    pub harm_score: u8,
    /// Safety score, always `100 - harm_score`.
    pub overall_score: u8,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub analyzed_at: DateTime<Utc>,
}
