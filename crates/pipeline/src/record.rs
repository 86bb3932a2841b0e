//! The process record: phase state machine, append-only step history and
//! retry bookkeeping for one log's journey through the pipeline.
//!
//! A [`ProcessRecord`] is created at ingestion, mutated only by the
//! orchestrator, and frozen once [`ProcessRecord::finish`] is called. Steps are
//! immutable values appended in execution order, which makes the record usable
//! as an audit log.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    Classification, GateDecision, IssueDraft, LogEntryId, LogLevel, PipelineError, ProcessId,
    PublishedIssue, ReviewVerdict, Timestamp,
};

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Named state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Received,
    Analyzing,
    Drafting,
    Reviewing,
    Refining,
    Publishing,
    Notifying,
    Completed,
    Skipped,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }

    /// Legal edges of the state machine. `Failed` is reachable from every
    /// non-terminal phase.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Received, Analyzing)
                | (Analyzing, Skipped)
                | (Analyzing, Drafting)
                | (Drafting, Reviewing)
                | (Reviewing, Publishing)
                | (Reviewing, Refining)
                | (Refining, Reviewing)
                | (Publishing, Notifying)
                | (Notifying, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Analyzing => "analyzing",
            Self::Drafting => "drafting",
            Self::Reviewing => "reviewing",
            Self::Refining => "refining",
            Self::Publishing => "publishing",
            Self::Notifying => "notifying",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalResult {
    Success,
    SkippedNotABug,
    SkippedLowPriority,
    Failed,
}

impl TerminalResult {
    /// Terminal phase that corresponds to this result.
    pub fn phase(self) -> Phase {
        match self {
            Self::Success => Phase::Completed,
            Self::SkippedNotABug | Self::SkippedLowPriority => Phase::Skipped,
            Self::Failed => Phase::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// Outcome of one gateway attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
    RateLimited,
}

/// Bookkeeping for one call to a side-effecting gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based.
    pub number: u32,
    pub started_at: Timestamp,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration: Duration,
}

/// Attempt against the publication gateway.
pub type CreationAttempt = Attempt;
/// Attempt against the notification gateway.
pub type NotificationAttempt = Attempt;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Structured output recorded with a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSummary {
    Received {
        log_entry_id: LogEntryId,
        level: LogLevel,
    },
    Classified {
        classification: Classification,
        /// `true` when the classification came from the level-based fallback.
        fallback: bool,
        decision: GateDecision,
    },
    Drafted {
        draft: IssueDraft,
    },
    Reviewed {
        iteration: u32,
        verdict: ReviewVerdict,
        /// Accepted at the final iteration on the secondary threshold.
        accepted_with_reservation: bool,
    },
    Refined {
        iteration: u32,
        draft: IssueDraft,
    },
    Published {
        attempts: Vec<CreationAttempt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue: Option<PublishedIssue>,
    },
    Notified {
        attempts: Vec<NotificationAttempt>,
        about_failure: bool,
    },
}

/// Immutable record of one stage attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub phase: Phase,
    /// Collaborator that performed the stage.
    pub collaborator: String,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<StepSummary>,
}

impl ProcessStep {
    /// A step that completed successfully now.
    pub fn succeeded(
        phase: Phase,
        collaborator: impl Into<String>,
        started_at: Timestamp,
        summary: StepSummary,
    ) -> Self {
        Self {
            phase,
            collaborator: collaborator.into(),
            started_at,
            finished_at: Timestamp::now().max(started_at),
            success: true,
            error: None,
            summary: Some(summary),
        }
    }

    /// A step that failed now.
    pub fn failed(
        phase: Phase,
        collaborator: impl Into<String>,
        started_at: Timestamp,
        error: impl Into<String>,
        summary: Option<StepSummary>,
    ) -> Self {
        Self {
            phase,
            collaborator: collaborator.into(),
            started_at,
            finished_at: Timestamp::now().max(started_at),
            success: false,
            error: Some(error.into()),
            summary,
        }
    }

    /// Attaches a recovered error to a successful step.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn duration(&self) -> Duration {
        self.finished_at.duration_since(self.started_at)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Where and why a process failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub phase: Phase,
    pub error: PipelineError,
    pub message: String,
}

/// How notification went, when it was attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub delivered: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate root for one process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    process_id: ProcessId,
    phase: Phase,
    steps: Vec<ProcessStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    terminal_result: Option<TerminalResult>,
    started_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_entry_id: Option<LogEntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skip_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    published_issue: Option<PublishedIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notification: Option<NotificationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureInfo>,
}

impl ProcessRecord {
    /// Creates a record in the `Received` phase.
    pub fn new(process_id: ProcessId) -> Self {
        Self {
            process_id,
            phase: Phase::Received,
            steps: Vec::new(),
            terminal_result: None,
            started_at: Timestamp::now(),
            finished_at: None,
            log_entry_id: None,
            classification: None,
            skip_rationale: None,
            published_issue: None,
            notification: None,
            failure: None,
        }
    }

    // -- read access -------------------------------------------------------

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn steps(&self) -> &[ProcessStep] {
        &self.steps
    }

    pub fn terminal_result(&self) -> Option<TerminalResult> {
        self.terminal_result
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    pub fn is_frozen(&self) -> bool {
        self.terminal_result.is_some()
    }

    pub fn log_entry_id(&self) -> Option<LogEntryId> {
        self.log_entry_id
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn skip_rationale(&self) -> Option<&str> {
        self.skip_rationale.as_deref()
    }

    pub fn published_issue(&self) -> Option<&PublishedIssue> {
        self.published_issue.as_ref()
    }

    pub fn notification(&self) -> Option<&NotificationOutcome> {
        self.notification.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureInfo> {
        self.failure.as_ref()
    }

    /// `true` for a successful process whose notification did not go out.
    pub fn notification_degraded(&self) -> bool {
        self.terminal_result == Some(TerminalResult::Success)
            && self.notification.as_ref().is_some_and(|n| !n.delivered)
    }

    /// Steps recorded for `phase`, in order.
    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &ProcessStep> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// Attempts made against the publication gateway.
    pub fn creation_attempts(&self) -> &[CreationAttempt] {
        self.attempts_in(Phase::Publishing)
    }

    /// Attempts made against the notification gateway.
    pub fn notification_attempts(&self) -> &[NotificationAttempt] {
        self.attempts_in(Phase::Notifying)
    }

    fn attempts_in(&self, phase: Phase) -> &[Attempt] {
        self.steps_in(phase)
            .last()
            .and_then(|s| match &s.summary {
                Some(StepSummary::Published { attempts, .. })
                | Some(StepSummary::Notified { attempts, .. }) => Some(attempts.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Checks that the step phases form a legal path through the state
    /// machine and, for a finished record, that the path ends in the terminal
    /// phase.
    pub fn has_valid_history(&self) -> bool {
        let Some(first) = self.steps.first() else {
            return !self.is_frozen();
        };
        if first.phase != Phase::Received {
            return false;
        }
        let edges_ok = self
            .steps
            .windows(2)
            .all(|w| w[0].phase == w[1].phase || w[0].phase.can_transition_to(w[1].phase));
        let end_ok = match self.terminal_result {
            Some(result) => self
                .steps
                .last()
                .is_some_and(|last| last.phase.can_transition_to(result.phase())),
            None => true,
        };
        edges_ok && end_ok
    }

    // -- mutation (orchestrator only) --------------------------------------

    /// Moves to `next`. Illegal transitions and transitions on a frozen record
    /// are refused and reported as `false`.
    pub fn advance(&mut self, next: Phase) -> bool {
        if self.is_frozen() || !self.phase.can_transition_to(next) || next.is_terminal() {
            tracing::error!(
                process_id = %self.process_id,
                from = %self.phase,
                to = %next,
                "refusing illegal phase transition"
            );
            return false;
        }
        tracing::debug!(process_id = %self.process_id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        true
    }

    /// Appends a step for the current phase. Ignored once frozen.
    pub fn push_step(&mut self, step: ProcessStep) {
        if self.is_frozen() {
            tracing::error!(process_id = %self.process_id, "step appended to a frozen record was dropped");
            return;
        }
        debug_assert_eq!(step.phase, self.phase, "step phase must match the current phase");
        self.steps.push(step);
    }

    pub fn set_log_entry(&mut self, id: LogEntryId) {
        self.log_entry_id = Some(id);
    }

    pub fn set_classification(&mut self, classification: Classification) {
        self.classification = Some(classification);
    }

    pub fn set_published_issue(&mut self, issue: PublishedIssue) {
        self.published_issue = Some(issue);
    }

    pub fn set_notification(&mut self, outcome: NotificationOutcome) {
        self.notification = Some(outcome);
    }

    /// Records a failure for the current phase without finishing the record.
    ///
    /// Used when the process continues (publication failure still notifies).
    pub fn note_failure(&mut self, error: PipelineError) {
        if self.failure.is_none() {
            self.failure = Some(FailureInfo {
                phase: self.phase,
                message: error.to_string(),
                error,
            });
        }
    }

    /// Ends the process as skipped.
    pub fn skip(&mut self, result: TerminalResult, rationale: impl Into<String>) {
        self.skip_rationale = Some(rationale.into());
        self.finish(result);
    }

    /// Ends the process as failed in the current phase.
    pub fn fail(&mut self, error: PipelineError) {
        self.note_failure(error);
        self.finish(TerminalResult::Failed);
    }

    /// Freezes the record with `result`.
    pub fn finish(&mut self, result: TerminalResult) {
        if self.is_frozen() {
            return;
        }
        let last_step_end = self.steps.last().map(|s| s.finished_at);
        let now = Timestamp::now();
        self.finished_at = Some(last_step_end.map_or(now, |end| now.max(end)));
        self.phase = result.phase();
        self.terminal_result = Some(result);
    }
}
