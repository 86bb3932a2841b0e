//! Errors raised by LLM providers.

use std::time::Duration;

use pipeline::{CollaboratorError, RetryPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing API key")]
    MissingApiKey,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("provider error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("request rejected with {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => Self::Authentication(message),
            429 => Self::RateLimited {
                message,
                retry_after,
            },
            // 529 is Anthropic's "overloaded".
            500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::RateLimited { retry_after, .. } => RetryPolicy::Retryable {
                after: *retry_after,
            },
            Self::Server { .. } | Self::Timeout | Self::Transport(_) => {
                RetryPolicy::Retryable { after: None }
            }
            Self::MissingApiKey
            | Self::Authentication(_)
            | Self::Rejected { .. }
            | Self::InvalidResponse(_) => RetryPolicy::NonRetryable,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<LlmError> for CollaboratorError {
    fn from(error: LlmError) -> Self {
        CollaboratorError::Provider(error.to_string())
    }
}
