//! Continuation gate: decides once per process whether a classified log
//! proceeds past ANALYZING.

use serde::{Deserialize, Serialize};

use crate::{Classification, GateConfig, Severity};

/// Outcome of evaluating the continuation gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Continue,
    SkipNotABug { rationale: String },
    SkipLowPriority { rationale: String },
}

impl GateDecision {
    pub fn should_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// Evaluates the continuation predicate and the low-priority filter.
///
/// The predicate passes when the log is a bug, or when the classifier is
/// confident (`> confidence_threshold`) about something above low severity.
/// Bugs below `minimum_severity` are then skipped as low priority unless the
/// configuration opts into creating them.
pub fn evaluate(classification: &Classification, config: &GateConfig) -> GateDecision {
    let severity = classification.effective_severity();
    let confident_and_notable = classification.confidence.as_f64() > config.confidence_threshold
        && severity != Severity::Low;

    if !classification.is_bug && !confident_and_notable {
        return GateDecision::SkipNotABug {
            rationale: rationale_or(classification, "classifier did not identify a bug"),
        };
    }

    if classification.is_bug
        && severity < config.minimum_severity
        && !config.create_low_priority_issues
    {
        return GateDecision::SkipLowPriority {
            rationale: format!(
                "{} (severity {} is below the minimum {})",
                rationale_or(classification, "bug below the severity bar"),
                severity,
                config.minimum_severity
            ),
        };
    }

    GateDecision::Continue
}

fn rationale_or(classification: &Classification, fallback: &str) -> String {
    if classification.rationale.trim().is_empty() {
        fallback.to_string()
    } else {
        classification.rationale.clone()
    }
}
