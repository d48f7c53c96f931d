use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use super::ToolError;

const RESULT_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Debug, Default, Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Brave web search API client.
#[derive(Clone)]
pub struct BraveSearchClient {
    client: reqwest::Client,
    endpoint: String,
}

impl BraveSearchClient {
    pub fn new(api_key: &str, endpoint: &str, timeout: Duration) -> Result<Self, ToolError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(api_key)
            .map_err(|_| ToolError::Search("search API key is not a valid header value".into()))?;
        headers.insert("X-Subscription-Token", token);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ToolError::Search(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ToolError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", &RESULT_COUNT.to_string())])
            .send()
            .await
            .map_err(|e| ToolError::Search(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Search(format!("search API returned {status}: {body}")));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Search(format!("unreadable search response: {e}")))?;

        Ok(parsed
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .take(RESULT_COUNT)
            .collect())
    }
}

/// Numbered `title / url / snippet` listing handed back to the model.
pub fn render_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No search results for: {query}");
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. {}\n   {}\n   {}",
                i + 1,
                r.title.trim(),
                r.url.trim(),
                r.description.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
