use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::prompts::{EXTRACTION_SYSTEM_PROMPT, extraction_user_message};
use crate::analysis::{ExtractedProduct, ScrapedProduct};
use crate::llm::{LlmError, LlmProvider, Message, MessageRequest, parse_latest_payload};

const EXTRACTION_MAX_TOKENS: u32 = 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("extraction call failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("extraction output was not a product record: {0}")]
    Parse(String),
}

/// Converts scraped page text into a structured product record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductExtractor: Send + Sync {
    async fn extract(&self, scraped: &ScrapedProduct) -> Result<ExtractedProduct, ExtractionError>;
}

/// Single-turn, tool-less provider call.
pub struct ExtractionCall {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl ExtractionCall {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ProductExtractor for ExtractionCall {
    #[instrument(skip_all, fields(url = %scraped.url, scraper = scraped.scraper))]
    async fn extract(&self, scraped: &ScrapedProduct) -> Result<ExtractedProduct, ExtractionError> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: EXTRACTION_MAX_TOKENS,
            system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            messages: vec![Message::user_text(extraction_user_message(&scraped.raw_text))],
            tools: Vec::new(),
        };

        let response = self.provider.create_message(&request).await?;
        let product: ExtractedProduct =
            parse_latest_payload(&response.text_blocks()).map_err(|e| {
                warn!(error = %e, "Extraction output did not parse");
                ExtractionError::Parse(e)
            })?;

        info!(
            product_name = %product.product_name,
            ingredients = product.ingredients.len(),
            "Extracted product record"
        );
        Ok(product)
    }
}
