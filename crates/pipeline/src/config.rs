//! Explicit pipeline configuration.
//!
//! A [`PipelineConfig`] is constructed once (by the CLI from a TOML file, or by
//! tests directly) and handed to the orchestrator. Every field has a default so
//! partial configuration files are valid; [`PipelineConfig::validate`] rejects
//! values the state machine cannot honour.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Severity};

/// Upper bound on every configured wait or timeout: one day.
pub const MAX_DURATION_SECONDS: f64 = 86_400.0;

/// Converts configured seconds, clamped to `0..=MAX_DURATION_SECONDS`.
fn seconds(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(value.clamp(0.0, MAX_DURATION_SECONDS))
}

/// Top-level configuration for one orchestrator instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub gate: GateConfig,
    pub review: ReviewConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
    pub analysis: AnalysisConfig,
}

impl PipelineConfig {
    /// Checks every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gate.validate()?;
        self.review.validate()?;
        self.retry.validate()?;
        self.timeouts.validate()
    }
}

// ---------------------------------------------------------------------------

/// Continuation gate applied to the classifier's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// A non-bug still continues when confidence exceeds this value and its
    /// severity is above low.
    pub confidence_threshold: f64,
    /// Bugs below this severity are skipped as low priority unless
    /// `create_low_priority_issues` is set.
    pub minimum_severity: Severity,
    pub create_low_priority_issues: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            minimum_severity: Severity::Low,
            create_low_priority_issues: false,
        }
    }
}

impl GateConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::new(
                "gate.confidence_threshold",
                "must be within [0.0, 1.0]",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// Review–refinement loop and scoring thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReviewConfig {
    /// Maximum number of review passes (and therefore at most
    /// `max_iterations - 1` refinements).
    pub max_iterations: u32,
    /// Overall score required for approval.
    pub approval_threshold: f64,
    /// Lowered bar applied only when the final iteration is not approved.
    pub secondary_threshold: f64,
    pub structure: StructuralThresholds,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            approval_threshold: 7.0,
            secondary_threshold: 6.0,
            structure: StructuralThresholds::default(),
        }
    }
}

impl ReviewConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::new("review.max_iterations", "must be at least 1"));
        }
        for (field, value) in [
            ("review.approval_threshold", self.approval_threshold),
            ("review.secondary_threshold", self.secondary_threshold),
        ] {
            if !(0.0..=10.0).contains(&value) {
                return Err(ConfigError::new(field, "must be within [0.0, 10.0]"));
            }
        }
        if self.secondary_threshold > self.approval_threshold {
            return Err(ConfigError::new(
                "review.secondary_threshold",
                "must not exceed review.approval_threshold",
            ));
        }
        self.structure.validate()
    }
}

/// Objective length and shape checks applied to every draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StructuralThresholds {
    pub min_title_length: usize,
    pub max_title_length: usize,
    pub min_body_length: usize,
    pub min_sections: usize,
    pub required_labels: Vec<String>,
}

impl Default for StructuralThresholds {
    fn default() -> Self {
        Self {
            min_title_length: 15,
            max_title_length: 100,
            min_body_length: 100,
            min_sections: 3,
            required_labels: vec!["bug".to_string()],
        }
    }
}

impl StructuralThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_title_length > self.max_title_length {
            return Err(ConfigError::new(
                "review.structure.min_title_length",
                "must not exceed max_title_length",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// Retry controller settings shared by publication and notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub retry_delay_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_seconds: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        seconds(self.retry_delay_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::new("retry.max_attempts", "must be at least 1"));
        }
        if !(0.0..=MAX_DURATION_SECONDS).contains(&self.retry_delay_seconds) {
            return Err(ConfigError::new(
                "retry.retry_delay_seconds",
                "must be between 0 and 86400",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// Per-call timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Classifier, Drafter, ReviewEngine and Refiner calls.
    pub collaborator_seconds: f64,
    /// Each individual gateway attempt.
    pub gateway_seconds: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            collaborator_seconds: 60.0,
            gateway_seconds: 30.0,
        }
    }
}

impl TimeoutConfig {
    pub fn collaborator(&self) -> Duration {
        seconds(self.collaborator_seconds)
    }

    pub fn gateway(&self) -> Duration {
        seconds(self.gateway_seconds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("timeouts.collaborator_seconds", self.collaborator_seconds),
            ("timeouts.gateway_seconds", self.gateway_seconds),
        ] {
            if !(value > 0.0 && value <= MAX_DURATION_SECONDS) {
                return Err(ConfigError::new(field, "must be positive and at most 86400"));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------

/// Local-recovery policy for the ANALYZING phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Replace a failed classification with a conservative one derived from
    /// the log level instead of failing the process.
    pub fallback_on_classifier_error: bool,
}
