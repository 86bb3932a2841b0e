//! Retry controller for the two side-effecting gateway calls.
//!
//! One parameterised controller serves both publication and notification so
//! the two share identical semantics:
//!
//! - at most `max_attempts` attempts, each bounded by the gateway timeout;
//! - only transient causes (rate limiting, 5xx, timeout, transport) are
//!   retried, permanent causes stop immediately;
//! - a fixed delay between attempts, raised to the server's `Retry-After`
//!   hint when one is given;
//! - no attempt is made after a success has been observed;
//! - every attempt is recorded, and the history collected so far is returned
//!   even when the loop is cancelled.

use std::future::Future;
use std::time::Duration;

use pipeline::{
    Attempt, AttemptStatus, FailureCause, GatewayError, Phase, PipelineError, RetryConfig,
    RetryPolicy, Timestamp,
};
use tokio_util::sync::CancellationToken;

/// Upper bound on a server-provided back-off hint.
const MAX_SERVER_BACKOFF: Duration = Duration::from_secs(60);

/// Result of running an operation under the [`RetryController`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Success value, or the error that ended the loop (`Gateway` or `Cancelled`).
    pub result: Result<T, PipelineError>,
    pub attempts: Vec<Attempt>,
}

/// Bounded, fixed-delay retry loop for idempotent-until-observed calls.
#[derive(Debug, Clone)]
pub struct RetryController {
    max_attempts: u32,
    delay: Duration,
    attempt_timeout: Duration,
}

impl RetryController {
    pub fn new(config: &RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
            attempt_timeout,
        }
    }

    /// Runs `call` until it succeeds, fails permanently, runs out of attempts
    /// or `cancel` fires. `call` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(
        &self,
        phase: Phase,
        cancel: &CancellationToken,
        mut call: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempts = Vec::new();
        let mut number = 0;

        loop {
            number += 1;
            let started_at = Timestamp::now();
            let clock = tokio::time::Instant::now();
            let result = match tokio::time::timeout(self.attempt_timeout, call(number)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(GatewayError::timeout(format!(
                    "no response within {:?}",
                    self.attempt_timeout
                ))),
            };
            let duration = clock.elapsed();

            let error = match result {
                Ok(value) => {
                    tracing::debug!(%phase, attempt = number, ?duration, "attempt succeeded");
                    attempts.push(Attempt {
                        number,
                        started_at,
                        status: AttemptStatus::Success,
                        error: None,
                        duration,
                    });
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(error) => error,
            };

            attempts.push(Attempt {
                number,
                started_at,
                status: if error.cause == FailureCause::RateLimited {
                    AttemptStatus::RateLimited
                } else {
                    AttemptStatus::Failed
                },
                error: Some(error.to_string()),
                duration,
            });

            let wait = match error.retry_policy() {
                RetryPolicy::Retryable { after } if number < self.max_attempts => {
                    after.map_or(self.delay, |hint| hint.min(MAX_SERVER_BACKOFF).max(self.delay))
                }
                RetryPolicy::Retryable { .. } => {
                    tracing::warn!(%phase, attempts = number, error = %error, "attempts exhausted");
                    return gave_up(phase, number, error, attempts);
                }
                RetryPolicy::NonRetryable => {
                    tracing::warn!(%phase, attempt = number, error = %error, "permanent failure, not retrying");
                    return gave_up(phase, number, error, attempts);
                }
            };

            tracing::info!(
                %phase,
                attempt = number,
                max_attempts = self.max_attempts,
                cause = %error.cause,
                ?wait,
                "transient failure, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return RetryOutcome {
                        result: Err(PipelineError::Cancelled { phase: phase.to_string() }),
                        attempts,
                    };
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn gave_up<T>(
    phase: Phase,
    attempts_made: u32,
    source: GatewayError,
    attempts: Vec<Attempt>,
) -> RetryOutcome<T> {
    RetryOutcome {
        result: Err(PipelineError::Gateway {
            operation: phase.to_string(),
            attempts: attempts_made,
            source,
        }),
        attempts,
    }
}
