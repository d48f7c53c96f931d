use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::backoff::calculate_backoff_delay;
use super::errors::LlmError;
use super::types::{MessageRequest, MessageResponse};
use super::LlmProvider;

const API_VERSION: &str = "2023-06-01";
const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Messages API client with bounded retries on transient failures.
#[derive(Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    endpoint: String,
    base_retry_delay: Duration,
}

impl AnthropicClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| LlmError::Client("api key is not a valid header value".into()))?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            base_retry_delay: BASE_RETRY_DELAY,
        })
    }

    /// Shorter backoff for tests against a local mock server.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    async fn send_once(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(LlmError::from_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<MessageResponse>()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for AnthropicClient {
    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(response) => {
                    debug!(
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        stop_reason = ?response.stop_reason,
                        "Provider call completed"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retriable() && attempt < MAX_RETRIES => {
                    let delay = calculate_backoff_delay(attempt, self.base_retry_delay);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
