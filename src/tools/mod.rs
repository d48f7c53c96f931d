//! Tools the analysis call can hand to the model: `web_search` and `web_fetch`.

pub mod fetch;
pub mod search;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::fetcher::HttpFetcher;
use crate::llm::ToolDefinition;

pub use fetch::{MAX_PAGE_TEXT_CHARS, visible_text};
pub use search::{BraveSearchClient, SearchResult};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {0} is not available for this analysis")]
    NotPermitted(String),

    #[error("invalid tool input: {0}")]
    InvalidInput(String),

    #[error("web search is not configured")]
    SearchUnavailable,

    #[error("search failed: {0}")]
    Search(String),

    #[error("fetch failed: {0}")]
    Fetch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    WebSearch,
    WebFetch,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::WebFetch => "web_fetch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "web_search" => Some(Self::WebSearch),
            "web_fetch" => Some(Self::WebFetch),
            _ => None,
        }
    }

    pub fn definition(self) -> ToolDefinition {
        match self {
            Self::WebSearch => ToolDefinition {
                name: self.name().to_string(),
                description: "Search the web for information about a product, its ingredients, \
                              or the health effects of a substance"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Search query"}
                    },
                    "required": ["query"]
                }),
            },
            Self::WebFetch => ToolDefinition {
                name: self.name().to_string(),
                description: "Fetch a web page and return its visible text".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "URL to fetch"}
                    },
                    "required": ["url"]
                }),
            },
        }
    }
}

/// The tools declared to the model for one analysis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    kinds: Vec<ToolKind>,
}

impl ToolSet {
    /// Extraction path: the product record is already known.
    pub fn search_only() -> Self {
        Self {
            kinds: vec![ToolKind::WebSearch],
        }
    }

    /// Fallback path: the model has to read the page itself.
    pub fn search_and_fetch() -> Self {
        Self {
            kinds: vec![ToolKind::WebSearch, ToolKind::WebFetch],
        }
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.kinds.iter().map(|kind| kind.definition()).collect()
    }

    /// Resolve a model-requested tool name against this set.
    pub fn resolve(&self, name: &str) -> Result<ToolKind, ToolError> {
        let kind = ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.into()))?;
        if self.contains(kind) {
            Ok(kind)
        } else {
            Err(ToolError::NotPermitted(name.into()))
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one tool and return the text handed back to the model.
    async fn execute(&self, kind: ToolKind, input: &Value) -> Result<String, ToolError>;
}

/// Live tool implementations backed by the search API and the page fetcher.
pub struct WebTools {
    search: Option<BraveSearchClient>,
    fetcher: HttpFetcher,
}

impl WebTools {
    pub fn new(search: Option<BraveSearchClient>, fetcher: HttpFetcher) -> Self {
        Self { search, fetcher }
    }

    async fn web_search(&self, query: &str) -> Result<String, ToolError> {
        let Some(search) = &self.search else {
            warn!("web_search requested without a search API key");
            return Err(ToolError::SearchUnavailable);
        };
        let results = search.search(query).await?;
        Ok(search::render_results(query, &results))
    }

    async fn web_fetch(&self, url: &str) -> Result<String, ToolError> {
        let page = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| ToolError::Fetch(e.to_string()))?;
        let text = if page.is_html() {
            visible_text(&page.body_utf8, MAX_PAGE_TEXT_CHARS)
        } else {
            fetch::truncate_chars(&page.body_utf8, MAX_PAGE_TEXT_CHARS)
        };
        if text.is_empty() {
            return Err(ToolError::Fetch(format!("{url} has no readable text")));
        }
        Ok(text)
    }
}

#[async_trait]
impl ToolExecutor for WebTools {
    #[instrument(skip(self, input), fields(tool = kind.name()))]
    async fn execute(&self, kind: ToolKind, input: &Value) -> Result<String, ToolError> {
        let output = match kind {
            ToolKind::WebSearch => self.web_search(&string_arg(input, "query")?).await,
            ToolKind::WebFetch => self.web_fetch(&string_arg(input, "url")?).await,
        };
        match &output {
            Ok(text) => info!(chars = text.len(), "Tool call completed"),
            Err(e) => warn!(error = %e, "Tool call failed"),
        }
        output
    }
}

fn string_arg(input: &Value, key: &str) -> Result<String, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidInput(format!("missing string field `{key}`")))
}
