use serde::{Deserialize, Serialize};

/// Row of the read-only allergen reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllergenReference {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

/// Row of the read-only PFAS reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PfasReference {
    pub name: String,
    #[serde(default)]
    pub cas_number: Option<String>,
    #[serde(default)]
    pub body_effects: Option<String>,
}

/// A sample of the reference tables plus their full sizes, embedded in the
/// analysis prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KnowledgeSnapshot {
    pub allergens: Vec<AllergenReference>,
    pub allergen_total: usize,
    pub pfas: Vec<PfasReference>,
    pub pfas_total: usize,
}

impl KnowledgeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.allergens.is_empty() && self.pfas.is_empty()
    }
}
