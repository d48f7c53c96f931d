//! The two provider-backed stages: extraction and hazard analysis.

pub mod analysis;
pub mod extraction;
pub mod prompts;

pub use analysis::{AnalysisContext, AnalysisError, AnalysisSubject, HazardAnalyst, ToolLoopAnalyst};
pub use extraction::{ExtractionCall, ExtractionError, ProductExtractor};

#[cfg(test)]
pub use analysis::MockHazardAnalyst;
#[cfg(test)]
pub use extraction::MockProductExtractor;
