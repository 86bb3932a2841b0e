//! Shared value types for the Bug Finder pipeline domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. confidences are in `[0.0, 1.0]`,
//! review scores are in `[0.0, 10.0]`) and participate in domain computations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Label, LogEntryId};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Elapsed time from `earlier` to `self`, clamped at zero.
    pub fn duration_since(self, earlier: Timestamp) -> std::time::Duration {
        (self.0 - earlier.0).to_std().unwrap_or_default()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Score types
// ---------------------------------------------------------------------------

/// Classifier confidence in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// Creates a [`Confidence`], returning `None` if `value` is outside
    /// the valid range `[0.0, 1.0]`.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a [`Confidence`], clamping into `[0.0, 1.0]`. Non-finite input
    /// maps to zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_finite() {
            Self(value.clamp(0.0, 1.0))
        } else {
            Self(0.0)
        }
    }

    /// Returns the confidence as an `f64` in `[0.0, 1.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("confidence {value} is outside [0.0, 1.0]"))
    }
}

impl From<Confidence> for f64 {
    fn from(value: Confidence) -> Self {
        value.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

// ---------------------------------------------------------------------------

/// A review score in the range `[0.0, 10.0]`.
///
/// Used both for the overall verdict score and for per-criterion scores.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ReviewScore(f64);

impl ReviewScore {
    /// Upper bound of the scale.
    pub const MAX: f64 = 10.0;

    /// Creates a [`ReviewScore`], returning `None` if `value` is outside
    /// the valid range `[0.0, 10.0]`.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_finite() && (0.0..=Self::MAX).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Creates a [`ReviewScore`], clamping out-of-range values into `[0.0, 10.0]`.
    ///
    /// Non-finite input maps to zero.
    pub fn clamped(value: f64) -> Self {
        if value.is_finite() {
            Self(value.clamp(0.0, Self::MAX))
        } else {
            Self(0.0)
        }
    }

    /// Returns the score as an `f64` in `[0.0, 10.0]`.
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Returns `true` if this score meets `threshold`.
    pub fn meets(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl TryFrom<f64> for ReviewScore {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("review score {value} is outside [0.0, 10.0]"))
    }
}

impl From<ReviewScore> for f64 {
    fn from(value: ReviewScore) -> Self {
        value.0
    }
}

impl std::fmt::Display for ReviewScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}/10", self.0)
    }
}

// ---------------------------------------------------------------------------
// Log entries
// ---------------------------------------------------------------------------

/// Severity level reported by the application that emitted a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl LogLevel {
    /// Parses a level name (case-insensitive, common aliases accepted).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" | "information" | "notice" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warning),
            "error" | "err" => Some(Self::Error),
            "critical" | "crit" => Some(Self::Critical),
            "fatal" | "panic" | "emergency" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// `true` for `error`, `critical` and `fatal`.
    pub fn is_error(self) -> bool {
        self >= Self::Error
    }

    /// `true` for `critical` and `fatal`.
    pub fn is_critical(self) -> bool {
        self >= Self::Critical
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------

/// Optional identifiers that tie a log line to a user, session or request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl CorrelationIds {
    /// Returns `true` when no identifier is present.
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.session_id.is_none() && self.request_id.is_none()
    }
}

/// Immutable input unit: one structured application log.
///
/// Created once per incoming log by [`crate::intake::structure_log`] and
/// never mutated afterwards; collaborators receive shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogEntryId,
    /// The log exactly as received.
    pub raw: String,
    pub timestamp: Timestamp,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "CorrelationIds::is_empty")]
    pub correlation: CorrelationIds,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How severe a detected bug is.
///
/// Ordered from least to most severe so thresholds can be compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Functional area a bug belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugCategory {
    Authentication,
    Database,
    Api,
    Frontend,
    Backend,
    Network,
    Security,
    Performance,
    DataIntegrity,
    ThirdParty,
    #[serde(other)]
    Unknown,
}

/// Output of the Classifier: is this log worth turning into an issue?
///
/// Invariant: `severity` is set whenever `is_bug` is true. Use
/// [`Classification::validate`] on values that crossed a trust boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub is_bug: bool,
    pub confidence: Confidence,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default = "unknown_category")]
    pub category: BugCategory,
    #[serde(default)]
    pub rationale: String,
}

fn unknown_category() -> BugCategory {
    BugCategory::Unknown
}

impl Classification {
    /// Checks the `is_bug ⇒ severity` invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_bug && self.severity.is_none() {
            return Err("classification marks the log as a bug but has no severity".to_string());
        }
        Ok(())
    }

    /// Severity with an absent value treated as [`Severity::Low`].
    pub fn effective_severity(&self) -> Severity {
        self.severity.unwrap_or(Severity::Low)
    }
}

// ---------------------------------------------------------------------------
// Issue drafts
// ---------------------------------------------------------------------------

/// Issue priority following the common P0–P3 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssuePriority {
    P0,
    P1,
    P2,
    P3,
}

impl IssuePriority {
    /// Default priority for a given bug severity.
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Self::P0,
            Severity::High => Self::P1,
            Severity::Medium => Self::P2,
            Severity::Low => Self::P3,
        }
    }
}

impl std::fmt::Display for IssuePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One headed section of an issue body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSection {
    pub heading: String,
    pub content: String,
}

impl DraftSection {
    pub fn new(heading: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            content: content.into(),
        }
    }
}

/// Structured issue content produced by the Drafter and replaced wholesale by
/// each refinement.
///
/// `revision` is stamped by the orchestrator: `0` for the initial draft,
/// incremented once per refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDraft {
    pub title: String,
    #[serde(default)]
    pub sections: Vec<DraftSection>,
    #[serde(default)]
    labels: Vec<Label>,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub priority: IssuePriority,
    #[serde(default)]
    pub reproduction_steps: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub revision: u32,
}

impl IssueDraft {
    /// Creates an empty draft with the given title and priority.
    pub fn new(title: impl Into<String>, priority: IssuePriority) -> Self {
        Self {
            title: title.into(),
            sections: Vec::new(),
            labels: Vec::new(),
            assignees: Vec::new(),
            priority,
            reproduction_steps: Vec::new(),
            environment: BTreeMap::new(),
            revision: 0,
        }
    }

    /// Adds a section to the body.
    pub fn with_section(mut self, heading: impl Into<String>, content: impl Into<String>) -> Self {
        self.sections.push(DraftSection::new(heading, content));
        self
    }

    /// Adds a label, ignoring duplicates (case-insensitive).
    pub fn with_label(mut self, label: Label) -> Self {
        self.add_label(label);
        self
    }

    /// Adds a label unless an equal one (case-insensitive) is already present.
    ///
    /// Insertion order is preserved for display.
    pub fn add_label(&mut self, label: Label) {
        let exists = self
            .labels
            .iter()
            .any(|l| l.as_str().eq_ignore_ascii_case(label.as_str()));
        if !exists {
            self.labels.push(label);
        }
    }

    /// Labels in insertion order, without duplicates.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Returns `true` if a label with this name (case-insensitive) is present.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.as_str().eq_ignore_ascii_case(name))
    }

    /// Checks that the draft can become an issue: a non-blank title and at
    /// least one section with content.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("draft has an empty title".to_string());
        }
        if !self.sections.iter().any(|s| !s.content.trim().is_empty()) {
            return Err("draft has no body sections".to_string());
        }
        Ok(())
    }

    /// Removes duplicate labels that may have arrived via deserialisation.
    pub fn dedup_labels(&mut self) {
        let labels = std::mem::take(&mut self.labels);
        for label in labels {
            self.add_label(label);
        }
    }

    /// Renders the body as Markdown.
    pub fn render_body(&self) -> String {
        let mut body = String::new();
        for section in &self.sections {
            body.push_str(&format!("## {}\n\n{}\n\n", section.heading, section.content.trim()));
        }
        if !self.reproduction_steps.is_empty() {
            body.push_str("## Steps to Reproduce\n\n");
            for (i, step) in self.reproduction_steps.iter().enumerate() {
                body.push_str(&format!("{}. {}\n", i + 1, step));
            }
            body.push('\n');
        }
        if !self.environment.is_empty() {
            body.push_str("## Environment\n\n");
            for (key, value) in &self.environment {
                body.push_str(&format!("- **{key}**: {value}\n"));
            }
            body.push('\n');
        }
        body.trim_end().to_string()
    }
}

// ---------------------------------------------------------------------------
// Review verdicts
// ---------------------------------------------------------------------------

/// A criterion a draft is scored against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewCriterion {
    TitleClarity,
    DescriptionCompleteness,
    Structure,
    Labels,
    ReproductionSteps,
    Environment,
    TechnicalAccuracy,
    Formatting,
}

impl ReviewCriterion {
    /// Structural criteria are objectively checkable without an LLM.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::TitleClarity
                | Self::DescriptionCompleteness
                | Self::Structure
                | Self::Labels
                | Self::ReproductionSteps
                | Self::Environment
        )
    }
}

/// Score and comment for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: ReviewCriterion,
    pub score: ReviewScore,
    /// Minimum score at which this criterion passes.
    pub passing_threshold: f64,
    pub comment: String,
}

impl CriterionScore {
    /// Returns `true` if the score meets the criterion's passing threshold.
    pub fn passes(&self) -> bool {
        self.score.meets(self.passing_threshold)
    }
}

/// Coarse outcome of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    NeedsImprovement,
    Rejected,
}

/// Outcome of reviewing one draft.
///
/// Invariant: `approved` implies `overall_score >= approval threshold` and no
/// criterion below its passing threshold. [`ReviewVerdict::new`] enforces it;
/// [`ReviewVerdict::is_consistent`] checks values built elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    pub status: ReviewStatus,
    pub overall_score: ReviewScore,
    #[serde(default)]
    pub criteria: Vec<CriterionScore>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl ReviewVerdict {
    /// Score at or above which a non-approved verdict counts as
    /// needs-improvement rather than rejected.
    pub const NEEDS_IMPROVEMENT_FLOOR: f64 = 5.0;

    /// Builds a verdict, granting approval only when the reviewer recommends
    /// it *and* the score and criteria invariants hold.
    pub fn new(
        overall_score: ReviewScore,
        criteria: Vec<CriterionScore>,
        improvements: Vec<String>,
        recommend_approval: bool,
        approval_threshold: f64,
    ) -> Self {
        let approved = recommend_approval
            && overall_score.meets(approval_threshold)
            && criteria.iter().all(CriterionScore::passes);
        let status = if approved {
            ReviewStatus::Approved
        } else if overall_score.meets(Self::NEEDS_IMPROVEMENT_FLOOR) {
            ReviewStatus::NeedsImprovement
        } else {
            ReviewStatus::Rejected
        };
        Self {
            approved,
            status,
            overall_score,
            criteria,
            improvements,
        }
    }

    /// Returns `true` unless the verdict claims approval without meeting the
    /// score threshold or with a failing criterion.
    pub fn is_consistent(&self, approval_threshold: f64) -> bool {
        !self.approved
            || (self.overall_score.meets(approval_threshold)
                && self.criteria.iter().all(CriterionScore::passes))
    }

    /// Criteria scored below their passing threshold.
    pub fn failing_criteria(&self) -> impl Iterator<Item = &CriterionScore> {
        self.criteria.iter().filter(|c| !c.passes())
    }
}
