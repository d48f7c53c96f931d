//! AI provider access: Messages API types, the HTTP client, and JSON payload parsing.

pub mod backoff;
pub mod client;
pub mod errors;
pub mod parse;
pub mod types;

use async_trait::async_trait;

pub use client::AnthropicClient;
pub use errors::LlmError;
pub use parse::{parse_json_payload, parse_latest_payload};
pub use types::{
    ContentBlock, Message, MessageRequest, MessageResponse, Role, StopReason, ToolDefinition,
    ToolInvocation, Usage,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn create_message(&self, request: &MessageRequest) -> Result<MessageResponse, LlmError>;
}
