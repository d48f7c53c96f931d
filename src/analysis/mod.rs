pub mod knowledge;
pub mod model;
pub mod request;

pub use knowledge::{AllergenReference, KnowledgeSnapshot, PfasReference};
pub use model::{
    DetectedAllergen, DetectedConcern, DetectedPfas, ExtractedProduct, HazardReport,
    ProductAnalysis, ScrapedProduct, Severity, ToxicityLevel,
};
pub use request::AnalysisRequest;
