//! Deterministic harm score over a detected-hazard payload.
//!
//! Points per detection are summed, scaled by a product-category multiplier,
//! rounded and clamped to `0..=100`. The safety score shown to users is the
//! complement `100 - harm`.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::analysis::{
    DetectedAllergen, DetectedConcern, DetectedPfas, HazardReport, Severity, ToxicityLevel,
};

const PFAS_POINTS: f64 = 40.0;
const MAX_SCORE: f64 = 100.0;

/// Harm and safety scores for one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarmScore {
    pub harm: u8,
    pub safety: u8,
}

impl HarmScore {
    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_harm_score(self.harm)
    }
}

pub fn calculate(report: &HazardReport, category: Option<&str>) -> HarmScore {
    score_detections(
        &report.allergens_detected,
        &report.pfas_detected,
        &report.other_concerns,
        category,
    )
}

pub fn score_detections(
    allergens: &[DetectedAllergen],
    pfas: &[DetectedPfas],
    concerns: &[DetectedConcern],
    category: Option<&str>,
) -> HarmScore {
    let allergen_points: f64 = allergens.iter().map(|a| severity_points(a.severity)).sum();
    let pfas_points = pfas.len() as f64 * PFAS_POINTS;
    let concern_points: f64 = concerns
        .iter()
        .map(|c| toxicity_points(c.toxicity_level))
        .sum();

    let raw = (allergen_points + pfas_points + concern_points) * category_multiplier(category);
    let harm = raw.round().clamp(0.0, MAX_SCORE) as u8;

    HarmScore {
        harm,
        safety: 100 - harm,
    }
}

pub fn severity_points(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 5.0,
        Severity::Moderate => 15.0,
        Severity::High => 30.0,
    }
}

pub fn toxicity_points(level: ToxicityLevel) -> f64 {
    match level {
        ToxicityLevel::Low => 5.0,
        ToxicityLevel::Medium => 15.0,
        ToxicityLevel::High => 25.0,
    }
}

/// Case-insensitive substring match; the first matching rule wins.
pub fn category_multiplier(category: Option<&str>) -> f64 {
    let Some(category) = category else {
        return 1.0;
    };
    let category = category.to_lowercase();

    if category.contains("pesticide") || category.contains("cleaner") {
        1.3
    } else if category.contains("food") {
        1.2
    } else if category.contains("cosmetic") {
        1.1
    } else {
        1.0
    }
}

/// Human-readable band for a harm score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum RiskLevel {
    Safe,
    #[serde(rename = "Low Risk")]
    LowRisk,
    #[serde(rename = "Moderate Risk")]
    ModerateRisk,
    #[serde(rename = "High Risk")]
    HighRisk,
    Dangerous,
}

impl RiskLevel {
    pub fn from_harm_score(harm: u8) -> Self {
        match harm {
            0..=20 => Self::Safe,
            21..=40 => Self::LowRisk,
            41..=60 => Self::ModerateRisk,
            61..=80 => Self::HighRisk,
            _ => Self::Dangerous,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "Safe",
            Self::LowRisk => "Low Risk",
            Self::ModerateRisk => "Moderate Risk",
            Self::HighRisk => "High Risk",
            Self::Dangerous => "Dangerous",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
