//! Core domain for the Bug Finder pipeline.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type and error type used to turn an application log into a reviewed issue.
//! Infrastructure crates implement the port traits defined here; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; the `nodes` crate sequences it and the
//! infrastructure crates define *how* to reach the outside world.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ProcessId`, `LogEntryId`, `IssueNumber`, `Label`, etc.) |
//! | [`types`] | Value types (`LogEntry`, `Classification`, `IssueDraft`, `ReviewVerdict`, etc.) |
//! | [`errors`] | Error taxonomy and `RetryPolicy` |
//! | [`config`] | `PipelineConfig` and its sections |
//! | [`intake`] | Structuring raw log text into a `LogEntry` |
//! | [`gate`] | Continuation predicate evaluated after classification |
//! | [`review`] | `StandardReviewEngine` and the structural checks |
//! | [`record`] | `ProcessRecord`, phases, steps and attempt bookkeeping |
//! | [`metrics`] | Per-process metrics and the cross-process aggregator |
//! | [`ports`] | Collaborator and gateway traits |

pub mod config;
pub mod errors;
pub mod gate;
pub mod identifiers;
pub mod intake;
pub mod metrics;
pub mod ports;
pub mod record;
pub mod review;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{
    AnalysisConfig, GateConfig, PipelineConfig, RetryConfig, ReviewConfig, StructuralThresholds,
    TimeoutConfig, MAX_DURATION_SECONDS,
};
pub use errors::{
    CollaboratorError, ConfigError, FailureCause, GatewayError, PipelineError, RetryPolicy,
    ValidationError,
};
pub use gate::GateDecision;
pub use identifiers::{IssueNumber, Label, LogEntryId, MessageId, ProcessId, RepositoryId};
pub use metrics::{MetricsAggregator, MetricsSnapshot, PhaseDuration, ProcessMetrics, StepDuration};
pub use ports::{
    Classifier, Completion, CompletionRequest, ContentAssessment, ContentReviewer, Drafter,
    IssuePayload, LlmProvider, NotificationGateway, NotificationKind, NotificationMessage,
    NotificationReceipt, PublicationGateway, PublishedIssue, Refiner, ReviewEngine,
};
pub use record::{
    Attempt, AttemptStatus, CreationAttempt, FailureInfo, NotificationAttempt,
    NotificationOutcome, Phase, ProcessRecord, ProcessStep, StepSummary, TerminalResult,
};
pub use review::{structural_review, StandardReviewEngine, StructuralReport};
pub use types::{
    BugCategory, Classification, Confidence, CorrelationIds, CriterionScore, DraftSection,
    IssueDraft, IssuePriority, LogEntry, LogLevel, ReviewCriterion, ReviewScore, ReviewStatus,
    ReviewVerdict, Severity, Timestamp,
};
