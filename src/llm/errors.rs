use thiserror::Error;

/// Failures talking to the AI provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("provider returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider request timed out")]
    Timeout,

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("could not decode provider response: {0}")]
    Decode(String),

    #[error("client build failed: {0}")]
    Client(String),
}

impl LlmError {
    /// Rate limits, server errors, overload (529) and timeouts are worth retrying.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Timeout | Self::Transport(_) => true,
            Self::Decode(_) | Self::Client(_) => false,
        }
    }

    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
