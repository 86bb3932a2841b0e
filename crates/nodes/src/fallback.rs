//! Conservative classification used when the classifier fails and the
//! degraded fallback is enabled.

use pipeline::{BugCategory, Classification, Confidence, LogEntry, LogLevel, Severity};

/// Confidence attached to every fallback classification.
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Derives a classification from the log level alone.
///
/// Error and above count as bugs; critical and fatal map to critical severity,
/// error to medium, anything else to low.
pub fn conservative_classification(log: &LogEntry) -> Classification {
    let severity = match log.level {
        LogLevel::Critical | LogLevel::Fatal => Severity::Critical,
        LogLevel::Error => Severity::Medium,
        LogLevel::Debug | LogLevel::Info | LogLevel::Warning => Severity::Low,
    };
    Classification {
        is_bug: log.level.is_error(),
        confidence: Confidence::clamped(FALLBACK_CONFIDENCE),
        severity: Some(severity),
        category: BugCategory::Unknown,
        rationale: format!(
            "classifier unavailable; derived from log level {}",
            log.level
        ),
    }
}
