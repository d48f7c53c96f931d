//! The analysis call: a tool-use conversation that ends in a hazard report.
//!
//! The loop is an explicit state machine. Each model turn is one
//! `AwaitingModel` step and counts against the iteration guard; a turn that
//! asks for tools moves to `ExecutingTools`, whose results go back to the model
//! in a single user message. A turn without tool requests is `Done`; its
//! latest text block holding a JSON object is decoded into a [`HazardReport`].

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::prompts::{analysis_system_prompt, bare_url_message, extracted_product_message};
use crate::analysis::{ExtractedProduct, HazardReport, KnowledgeSnapshot};
use crate::llm::{
    ContentBlock, LlmError, LlmProvider, Message, MessageRequest, ToolInvocation,
    parse_latest_payload,
};
use crate::tools::{ToolExecutor, ToolSet};

const ANALYSIS_MAX_TOKENS: u32 = 4096;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("analysis call failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("analysis output was not a hazard report: {0}")]
    Parse(String),

    #[error("analysis did not finish within {0} model turns")]
    IterationLimit(usize),

    #[error("provider protocol violation: {0}")]
    Protocol(String),
}

/// What the model is asked to analyze.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisSubject {
    /// Extraction path: a structured record from the scraped page.
    Extracted {
        url: String,
        product: ExtractedProduct,
    },
    /// Fallback path: only the URL is known.
    Url(String),
}

impl AnalysisSubject {
    pub fn url(&self) -> &str {
        match self {
            Self::Extracted { url, .. } => url,
            Self::Url(url) => url,
        }
    }

    /// Fetching is only offered when the page has not been read for the model.
    pub fn tool_set(&self) -> ToolSet {
        match self {
            Self::Extracted { .. } => ToolSet::search_only(),
            Self::Url(_) => ToolSet::search_and_fetch(),
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Extracted { url, product } => extracted_product_message(url, product),
            Self::Url(url) => bare_url_message(url),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisContext {
    pub allergen_profile: Vec<String>,
    pub knowledge: KnowledgeSnapshot,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HazardAnalyst: Send + Sync {
    async fn analyze(
        &self,
        subject: &AnalysisSubject,
        context: &AnalysisContext,
    ) -> Result<HazardReport, AnalysisError>;
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolInvocation>),
    Done(Vec<String>),
}

pub struct ToolLoopAnalyst {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolExecutor>,
    model: String,
    max_iterations: usize,
}

impl ToolLoopAnalyst {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolExecutor>,
        model: impl Into<String>,
        max_iterations: usize,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
            max_iterations,
        }
    }

    /// Run one requested tool; failures become `is_error` results for the model.
    async fn run_tool(&self, tool_set: &ToolSet, call: ToolInvocation) -> ContentBlock {
        let outcome = match tool_set.resolve(&call.name) {
            Ok(kind) => self.tools.execute(kind, &call.input).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(content) => ContentBlock::ToolResult {
                tool_use_id: call.id,
                content,
                is_error: false,
            },
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Returning tool error to model");
                ContentBlock::ToolResult {
                    tool_use_id: call.id,
                    content: format!("Error: {e}"),
                    is_error: true,
                }
            }
        }
    }
}

#[async_trait]
impl HazardAnalyst for ToolLoopAnalyst {
    #[instrument(skip_all, fields(url = %subject.url()))]
    async fn analyze(
        &self,
        subject: &AnalysisSubject,
        context: &AnalysisContext,
    ) -> Result<HazardReport, AnalysisError> {
        let tool_set = subject.tool_set();
        let mut request = MessageRequest {
            model: self.model.clone(),
            max_tokens: ANALYSIS_MAX_TOKENS,
            system: Some(analysis_system_prompt(
                &context.knowledge,
                &context.allergen_profile,
            )),
            messages: vec![Message::user_text(subject.user_message())],
            tools: tool_set.definitions(),
        };

        let mut turns = 0;
        let mut state = LoopState::AwaitingModel;
        let final_segments = loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if turns == self.max_iterations {
                        warn!(turns, "Analysis hit the iteration guard");
                        return Err(AnalysisError::IterationLimit(self.max_iterations));
                    }
                    turns += 1;

                    let response = self.provider.create_message(&request).await?;
                    request.messages.push(response.as_assistant_message());

                    let calls = response.tool_invocations();
                    if !response.wants_tools() {
                        LoopState::Done(
                            response.text_blocks().into_iter().map(str::to_string).collect(),
                        )
                    } else if calls.is_empty() {
                        return Err(AnalysisError::Protocol(
                            "tool_use stop without tool calls".into(),
                        ));
                    } else {
                        debug!(turn = turns, tools = calls.len(), "Model requested tools");
                        LoopState::ExecutingTools(calls)
                    }
                }
                LoopState::ExecutingTools(calls) => {
                    let mut results = Vec::with_capacity(calls.len());
                    for call in calls {
                        results.push(self.run_tool(&tool_set, call).await);
                    }
                    request.messages.push(Message::tool_results(results));
                    LoopState::AwaitingModel
                }
                LoopState::Done(segments) => break segments,
            };
        };

        let mut report: HazardReport =
            parse_latest_payload(&final_segments).map_err(AnalysisError::Parse)?;
        report.confidence = clamp_confidence(report.confidence);

        info!(
            turns,
            detections = report.detection_count(),
            confidence = report.confidence,
            "Analysis completed"
        );
        Ok(report)
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
