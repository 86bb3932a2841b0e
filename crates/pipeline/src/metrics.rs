//! Metrics derived from process records.
//!
//! [`ProcessMetrics`] describes a single finished record. [`MetricsAggregator`]
//! keeps running cross-process counters and is shared between concurrently
//! running processes; it only ever reads records.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Phase, ProcessId, ProcessRecord, TerminalResult};

/// Duration of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDuration {
    pub phase: Phase,
    pub collaborator: String,
    pub duration: Duration,
}

/// Time spent in one phase across all of its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDuration {
    pub phase: Phase,
    pub steps: usize,
    pub duration: Duration,
}

/// Per-process figures derived from a [`ProcessRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    pub process_id: ProcessId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_result: Option<TerminalResult>,
    /// End minus start; zero for a record that has not finished.
    pub total_duration: Duration,
    pub step_count: usize,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    /// Fraction of steps that succeeded, `0.0` when there are none.
    pub success_rate: f64,
    pub step_durations: Vec<StepDuration>,
    /// In order of first appearance.
    pub phase_durations: Vec<PhaseDuration>,
}

impl ProcessMetrics {
    pub fn from_record(record: &ProcessRecord) -> Self {
        let steps = record.steps();
        let steps_succeeded = steps.iter().filter(|s| s.success).count();

        let mut phase_durations: Vec<PhaseDuration> = Vec::new();
        for step in steps {
            let duration = step.duration();
            match phase_durations.iter_mut().find(|p| p.phase == step.phase) {
                Some(entry) => {
                    entry.steps += 1;
                    entry.duration += duration;
                }
                None => phase_durations.push(PhaseDuration {
                    phase: step.phase,
                    steps: 1,
                    duration,
                }),
            }
        }

        Self {
            process_id: record.process_id(),
            terminal_result: record.terminal_result(),
            total_duration: record
                .finished_at()
                .map(|end| end.duration_since(record.started_at()))
                .unwrap_or_default(),
            step_count: steps.len(),
            steps_succeeded,
            steps_failed: steps.len() - steps_succeeded,
            success_rate: if steps.is_empty() {
                0.0
            } else {
                steps_succeeded as f64 / steps.len() as f64
            },
            step_durations: steps
                .iter()
                .map(|s| StepDuration {
                    phase: s.phase,
                    collaborator: s.collaborator.clone(),
                    duration: s.duration(),
                })
                .collect(),
            phase_durations,
        }
    }
}

// ---------------------------------------------------------------------------
// Cross-process counters
// ---------------------------------------------------------------------------

/// Running counters shared by every process of one run.
///
/// All updates are single atomic increments, so concurrent completions never
/// lose counts.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    total_processed: AtomicU64,
    succeeded: AtomicU64,
    bugs_detected: AtomicU64,
    issues_created: AtomicU64,
    notifications_sent: AtomicU64,
    notification_failures: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the [`MetricsAggregator`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_processed: u64,
    pub succeeded: u64,
    pub bugs_detected: u64,
    pub issues_created: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a finished record into the counters. Unfinished records are
    /// ignored.
    pub fn observe(&self, record: &ProcessRecord) {
        let Some(result) = record.terminal_result() else {
            return;
        };
        bump(&self.total_processed);
        match result {
            TerminalResult::Success => bump(&self.succeeded),
            TerminalResult::SkippedNotABug | TerminalResult::SkippedLowPriority => {
                bump(&self.skipped)
            }
            TerminalResult::Failed => bump(&self.failed),
        }
        if record.classification().is_some_and(|c| c.is_bug) {
            bump(&self.bugs_detected);
        }
        if record.published_issue().is_some() {
            bump(&self.issues_created);
        }
        match record.notification() {
            Some(n) if n.delivered => bump(&self.notifications_sent),
            Some(_) => bump(&self.notification_failures),
            None => {}
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_processed: self.total_processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            bugs_detected: self.bugs_detected.load(Ordering::Relaxed),
            issues_created: self.issues_created.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
