//! Error taxonomy and retry-policy types for the Bug Finder pipeline domain.
//!
//! The taxonomy mirrors how the orchestrator reacts to a failure:
//!
//! | Type | Raised by | Orchestrator reaction |
//! |------|-----------|-----------------------|
//! | [`ValidationError`] | log structuring | immediate `FAILED`, no retry |
//! | [`CollaboratorError`] | Classifier, Drafter, ReviewEngine, Refiner, LLM | `FAILED` (or local fallback), never retried |
//! | [`GatewayError`] | PublicationGateway, NotificationGateway | retried iff [`GatewayError::retry_policy`] is retryable |
//! | [`PipelineError`] | the orchestrator itself | recorded on the failing step and surfaced on the record |
//!
//! [`RetryPolicy`] is a cross-cutting concern: any error type that participates
//! in retry decisions must be able to produce a [`RetryPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
///
/// Returned by gateway error types to let the retry controller decide
/// whether to re-invoke an operation.
///
/// - `Retryable` errors: rate limiting, 5xx-class responses, timeouts.
/// - `NonRetryable` errors: validation / 4xx-class rejections other than rate limiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    ///
    /// `after` optionally specifies the minimum delay before retrying (e.g.
    /// derived from `Retry-After` response headers).
    Retryable {
        /// Minimum back-off before the next attempt. `None` means apply the
        /// caller's own fixed delay.
        after: Option<Duration>,
    },
    /// The operation must not be retried.
    NonRetryable,
}

impl RetryPolicy {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

/// The incoming log could not be structured into a [`crate::LogEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("log input is empty")]
    EmptyInput,

    #[error("log has no usable message")]
    MissingMessage,

    #[error("log JSON must be an object, found {found}")]
    NotAnObject { found: String },
}

// ---------------------------------------------------------------------------
// Content collaborators
// ---------------------------------------------------------------------------

/// Failure of a content-producing collaborator (Classifier, Drafter,
/// ReviewEngine, Refiner) or of the LLM provider behind it.
///
/// Content generation is nondeterministic, so none of these are retried by
/// the orchestrator.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum CollaboratorError {
    /// The collaborator answered, but the answer could not be parsed or
    /// violated a domain invariant.
    #[error("malformed response from {collaborator}: {detail}")]
    Malformed { collaborator: String, detail: String },

    /// The collaborator (or the service behind it) failed outright.
    #[error("{collaborator} failed: {detail}")]
    Failed { collaborator: String, detail: String },

    /// The underlying model provider rejected or failed the request.
    #[error("LLM provider error: {0}")]
    Provider(String),
}

impl CollaboratorError {
    pub fn malformed(collaborator: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            collaborator: collaborator.into(),
            detail: detail.into(),
        }
    }

    pub fn failed(collaborator: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failed {
            collaborator: collaborator.into(),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Side-effecting gateways
// ---------------------------------------------------------------------------

/// Why a gateway call failed, as far as retry decisions are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The remote service asked us to slow down (HTTP 429 or equivalent).
    RateLimited,
    /// 5xx-class failure on the remote side.
    ServerError,
    /// No response within the per-attempt timeout.
    Timeout,
    /// Connection-level failure before any response was received.
    Transport,
    /// The remote service rejected the request (4xx other than rate limiting).
    Rejected,
    /// The payload was invalid before it was ever sent.
    InvalidPayload,
}

impl FailureCause {
    /// Transient causes are eligible for automatic re-attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Timeout | Self::Transport
        )
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::Timeout => "timeout",
            Self::Transport => "transport error",
            Self::Rejected => "rejected",
            Self::InvalidPayload => "invalid payload",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`crate::PublicationGateway`] or
/// [`crate::NotificationGateway`].
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{cause}: {message}")]
pub struct GatewayError {
    pub cause: FailureCause,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Server-provided back-off hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl GatewayError {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(FailureCause::RateLimited, message)
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureCause::Timeout, message)
    }

    /// Classifies an HTTP error status the way every gateway adapter does.
    ///
    /// `429` is rate limiting, `5xx` is a server error, anything else is a
    /// permanent rejection.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let cause = match status {
            429 => FailureCause::RateLimited,
            500..=599 => FailureCause::ServerError,
            _ => FailureCause::Rejected,
        };
        Self {
            status: Some(status),
            ..Self::new(cause, message)
        }
    }

    pub fn with_retry_after(mut self, after: Option<Duration>) -> Self {
        self.retry_after = after;
        self
    }

    /// Whether the retry controller may re-attempt after this failure.
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.cause.is_transient() {
            RetryPolicy::Retryable {
                after: self.retry_after,
            }
        } else {
            RetryPolicy::NonRetryable
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A [`crate::PipelineConfig`] value is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("invalid configuration: {field}: {message}")]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors that end a process in the `FAILED` state.
///
/// Every value of this type is attached to the [`crate::ProcessStep`] of the
/// phase that produced it before the record transitions.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The input log could not be structured.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A content collaborator failed or returned malformed output.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// A content collaborator did not answer within its timeout.
    #[error("{collaborator} timed out after {after:?}")]
    CollaboratorTimeout { collaborator: String, after: Duration },

    /// A gateway call failed terminally (permanent cause or attempts exhausted).
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Gateway {
        operation: String,
        attempts: u32,
        source: GatewayError,
    },

    /// The review loop ran out of iterations below the secondary threshold.
    #[error("review budget exhausted after {iterations} iteration(s) with score {score:.1} below {threshold:.1}")]
    ReviewBudgetExhausted {
        iterations: u32,
        score: f64,
        threshold: f64,
    },

    /// The process was cancelled at a phase boundary or during a retry wait.
    #[error("process cancelled during {phase}")]
    Cancelled { phase: String },
}
