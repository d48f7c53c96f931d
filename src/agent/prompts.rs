use std::fmt::Write;

use crate::analysis::{ExtractedProduct, KnowledgeSnapshot};

pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a data extraction expert. You receive text scraped from a retail product page \
and turn it into a structured product record.

Return only a JSON object with exactly this structure:
{
  \"product_name\": \"string\",
  \"brand\": \"string\",
  \"category\": \"string, e.g. food, cosmetic, cleaner, cookware, clothing\",
  \"ingredients\": [\"ingredient in label order\"],
  \"materials\": [\"material\"],
  \"features\": [\"feature\"],
  \"warnings\": [\"warning or caution text\"]
}

Use empty strings or empty lists for anything the text does not state. \
Do not invent ingredients.";

const ANALYSIS_PREAMBLE: &str = "\
You are a product safety analyst. Your job is to analyze products for harmful substances: \
allergens, PFAS (per- and polyfluoroalkyl substances, \"forever chemicals\"), and other toxins.

Output format: when you are done, reply with a single JSON object and nothing else:
{
  \"product_name\": \"string\",
  \"brand\": \"string\",
  \"product_category\": \"string, e.g. food, cosmetic, cleaner, pesticide, cookware\",
  \"ingredients\": [\"ingredient\"],
  \"allergens_detected\": [
    {\"name\": \"allergen\", \"severity\": \"low|moderate|high\", \"source\": \"where it was found\"}
  ],
  \"pfas_detected\": [
    {\"name\": \"compound\", \"cas_number\": \"CAS number if known\", \"body_effects\": \"effects on the body\", \"source\": \"where it was found\"}
  ],
  \"other_concerns\": [
    {\"name\": \"substance\", \"category\": \"heavy metal|carcinogen|endocrine disruptor|other\", \"toxicity_level\": \"low|medium|high\", \"description\": \"brief description\"}
  ],
  \"confidence\": 0.0
}
";

const ANALYSIS_GUIDELINES: &str = "
Guidelines:
- Be conservative: if uncertain, report the risk and lower your confidence.
- Check synonyms and alternate names for allergens and PFAS.
- If the ingredients are not listed, say so through a low confidence.
- Common PFAS indicators: \"non-stick\", \"water-resistant\", \"stain-resistant\", PTFE.
";

/// System prompt for the analysis call.
pub fn analysis_system_prompt(knowledge: &KnowledgeSnapshot, allergen_profile: &[String]) -> String {
    let mut prompt = String::from(ANALYSIS_PREAMBLE);

    if !knowledge.allergens.is_empty() {
        let _ = writeln!(
            prompt,
            "\nAllergen reference ({} entries, sample):",
            knowledge.allergen_total
        );
        for allergen in &knowledge.allergens {
            if allergen.synonyms.is_empty() {
                let _ = writeln!(prompt, "- {}", allergen.name);
            } else {
                let _ = writeln!(
                    prompt,
                    "- {}: synonyms {}",
                    allergen.name,
                    allergen.synonyms.join(", ")
                );
            }
        }
    }

    if !knowledge.pfas.is_empty() {
        let _ = writeln!(
            prompt,
            "\nPFAS reference ({} entries, sample):",
            knowledge.pfas_total
        );
        for pfas in &knowledge.pfas {
            let _ = writeln!(
                prompt,
                "- {} (CAS: {}): {}",
                pfas.name,
                pfas.cas_number.as_deref().unwrap_or("unknown"),
                pfas.body_effects.as_deref().unwrap_or("no description")
            );
        }
    }

    if !allergen_profile.is_empty() {
        let _ = writeln!(
            prompt,
            "\nUser's allergen profile. Pay special attention to these allergens: {}",
            allergen_profile.join(", ")
        );
    }

    prompt.push_str(ANALYSIS_GUIDELINES);
    prompt
}

pub fn extraction_user_message(raw_text: &str) -> String {
    format!("Extract the product record from this product page text:\n\n{raw_text}\n\nReturn the JSON object.")
}

pub fn extracted_product_message(url: &str, product: &ExtractedProduct) -> String {
    let record = serde_json::to_string_pretty(product).unwrap_or_default();
    format!(
        "Analyze this product for harmful substances.\n\nProduct URL: {url}\nProduct record:\n{record}\n\n\
         Use web_search if you need more information about the product or an ingredient. \
         Return your analysis as the JSON object described in the system prompt."
    )
}

pub fn bare_url_message(url: &str) -> String {
    format!(
        "Analyze this product for harmful substances: {url}\n\n\
         Use web_fetch to retrieve the product page and web_search for anything it leaves out. \
         Return your analysis as the JSON object described in the system prompt."
    )
}
