//! The process orchestrator: drives one log through every phase and records
//! each stage on its [`ProcessRecord`].
//!
//! Phases run strictly in sequence within a process. Separate processes share
//! nothing but the optional [`MetricsAggregator`], so any number of them can
//! run concurrently on the same orchestrator.

use std::sync::Arc;

use pipeline::{
    gate, intake, Classification, Classifier, CollaboratorError, ConfigError, Drafter,
    GateDecision, IssueDraft, IssuePayload, LogEntry, MetricsAggregator, NotificationGateway,
    NotificationKind, NotificationMessage, NotificationOutcome, Phase, PipelineConfig,
    PipelineError, ProcessId, ProcessRecord, ProcessStep, PublicationGateway, PublishedIssue,
    Refiner, ReviewEngine, StepSummary, TerminalResult, Timestamp,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::fallback::conservative_classification;
use crate::retry::{RetryController, RetryOutcome};
use crate::review_loop::{LoopOutcome, ReviewLoop};
use crate::stage;

/// Name recorded on the RECEIVED step.
const INTAKE: &str = "intake";

/// Longest summary carried in a notification.
const NOTIFICATION_SUMMARY_CHARS: usize = 300;

/// Typed collaborators, one per role, resolved at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub drafter: Arc<dyn Drafter>,
    pub review_engine: Arc<dyn ReviewEngine>,
    pub refiner: Arc<dyn Refiner>,
    pub publisher: Arc<dyn PublicationGateway>,
    pub notifier: Arc<dyn NotificationGateway>,
}

/// State machine sequencing classification, drafting, review, publication
/// and notification for one log at a time.
pub struct ProcessOrchestrator {
    collaborators: Collaborators,
    config: PipelineConfig,
    retry: RetryController,
    metrics: Option<Arc<MetricsAggregator>>,
}

impl ProcessOrchestrator {
    /// Builds an orchestrator, rejecting configuration the state machine
    /// cannot honour.
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let retry = RetryController::new(&config.retry, config.timeouts.gateway());
        Ok(Self {
            collaborators,
            config,
            retry,
            metrics: None,
        })
    }

    /// Folds every finished record into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsAggregator>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs one raw log through the pipeline and returns its frozen record.
    ///
    /// Never fails: every error ends up on the record. `cancel` is checked at
    /// each phase boundary and during retry waits.
    pub async fn process(&self, raw: &str, cancel: &CancellationToken) -> ProcessRecord {
        let mut record = ProcessRecord::new(ProcessId::new_random());
        let span = tracing::info_span!("process", process_id = %record.process_id());

        async {
            tracing::info!("process started");
            self.drive(raw, cancel, &mut record).await;
            tracing::info!(
                result = ?record.terminal_result(),
                steps = record.steps().len(),
                "process finished"
            );
        }
        .instrument(span)
        .await;

        if let Some(metrics) = &self.metrics {
            metrics.observe(&record);
        }
        record
    }

    async fn drive(&self, raw: &str, cancel: &CancellationToken, record: &mut ProcessRecord) {
        let Some(log) = self.receive(raw, record) else {
            return;
        };
        let Some(classification) = self.analyze(&log, record, cancel).await else {
            return;
        };
        let Some(draft) = self.draft(&log, &classification, record, cancel).await else {
            return;
        };

        let review = ReviewLoop {
            engine: self.collaborators.review_engine.as_ref(),
            refiner: self.collaborators.refiner.as_ref(),
            config: &self.config.review,
            timeout: self.config.timeouts.collaborator(),
        };
        let draft = match review.run(draft, record, cancel).await {
            LoopOutcome::Approved(draft) | LoopOutcome::AcceptedWithReservation(draft) => draft,
            LoopOutcome::Aborted => return,
        };

        if !stage::enter(record, Phase::Publishing, cancel) {
            return;
        }
        let published = match self.publish(&draft, record, cancel).await {
            PublishOutcome::Published(issue) => Some(issue),
            PublishOutcome::Failed(error) => {
                record.note_failure(error);
                None
            }
            PublishOutcome::Cancelled => return,
        };

        // Cancellation is handled inside `notify`: once an issue exists it only
        // degrades the notification.
        record.advance(Phase::Notifying);
        let kind = match &published {
            Some(issue) => NotificationKind::IssueCreated {
                issue: issue.clone(),
            },
            None => NotificationKind::PublicationFailed {
                error: record
                    .failure()
                    .map(|f| f.message.clone())
                    .unwrap_or_else(|| "publication failed".to_string()),
            },
        };
        let message = NotificationMessage {
            process_id: record.process_id(),
            kind,
            title: draft.title.clone(),
            summary: summarize(&draft),
            severity: classification.severity,
        };
        if !self.notify(&message, record, cancel).await {
            return;
        }

        record.finish(if published.is_some() {
            TerminalResult::Success
        } else {
            TerminalResult::Failed
        });
    }

    // -- RECEIVED ----------------------------------------------------------

    fn receive(&self, raw: &str, record: &mut ProcessRecord) -> Option<LogEntry> {
        let started_at = Timestamp::now();
        match intake::structure_log(raw, started_at) {
            Ok(log) => {
                tracing::debug!(log_entry_id = %log.id, level = %log.level, "log structured");
                record.set_log_entry(log.id);
                record.push_step(ProcessStep::succeeded(
                    Phase::Received,
                    INTAKE,
                    started_at,
                    StepSummary::Received {
                        log_entry_id: log.id,
                        level: log.level,
                    },
                ));
                Some(log)
            }
            Err(error) => {
                stage::fail_step(record, INTAKE, started_at, error.into());
                None
            }
        }
    }

    // -- ANALYZING ---------------------------------------------------------

    async fn analyze(
        &self,
        log: &LogEntry,
        record: &mut ProcessRecord,
        cancel: &CancellationToken,
    ) -> Option<Classification> {
        if !stage::enter(record, Phase::Analyzing, cancel) {
            return None;
        }
        let classifier = self.collaborators.classifier.as_ref();
        let started_at = Timestamp::now();

        let result = stage::call_collaborator(
            classifier.name(),
            self.config.timeouts.collaborator(),
            classifier.classify(log),
        )
        .await
        .and_then(|c| match c.validate() {
            Ok(()) => Ok(c),
            Err(detail) => Err(CollaboratorError::malformed(classifier.name(), detail).into()),
        });

        let (classification, fallback_cause) = match result {
            Ok(c) => (c, None),
            Err(error) if self.config.analysis.fallback_on_classifier_error => {
                tracing::warn!(error = %error, "classifier failed, using conservative classification");
                (conservative_classification(log), Some(error))
            }
            Err(error) => {
                stage::fail_step(record, classifier.name(), started_at, error);
                return None;
            }
        };

        let decision = gate::evaluate(&classification, &self.config.gate);
        tracing::info!(
            is_bug = classification.is_bug,
            confidence = classification.confidence.as_f64(),
            severity = ?classification.severity,
            proceed = decision.should_continue(),
            "log classified"
        );
        record.set_classification(classification.clone());

        let mut step = ProcessStep::succeeded(
            Phase::Analyzing,
            classifier.name(),
            started_at,
            StepSummary::Classified {
                classification: classification.clone(),
                fallback: fallback_cause.is_some(),
                decision: decision.clone(),
            },
        );
        if let Some(cause) = fallback_cause {
            step = step.with_error(cause.to_string());
        }
        record.push_step(step);

        match decision {
            GateDecision::Continue => Some(classification),
            GateDecision::SkipNotABug { rationale } => {
                record.skip(TerminalResult::SkippedNotABug, rationale);
                None
            }
            GateDecision::SkipLowPriority { rationale } => {
                record.skip(TerminalResult::SkippedLowPriority, rationale);
                None
            }
        }
    }

    // -- DRAFTING ----------------------------------------------------------

    async fn draft(
        &self,
        log: &LogEntry,
        classification: &Classification,
        record: &mut ProcessRecord,
        cancel: &CancellationToken,
    ) -> Option<IssueDraft> {
        if !stage::enter(record, Phase::Drafting, cancel) {
            return None;
        }
        let drafter = self.collaborators.drafter.as_ref();
        let started_at = Timestamp::now();

        let drafted = stage::call_collaborator(
            drafter.name(),
            self.config.timeouts.collaborator(),
            drafter.draft(log, classification),
        )
        .await
        .and_then(|draft| match draft.validate() {
            Ok(()) => Ok(draft),
            Err(detail) => Err(CollaboratorError::malformed(drafter.name(), detail).into()),
        });

        match drafted {
            Ok(mut draft) => {
                draft.revision = 0;
                draft.dedup_labels();
                tracing::info!(title = %draft.title, "draft created");
                record.push_step(ProcessStep::succeeded(
                    Phase::Drafting,
                    drafter.name(),
                    started_at,
                    StepSummary::Drafted {
                        draft: draft.clone(),
                    },
                ));
                Some(draft)
            }
            Err(error) => {
                stage::fail_step(record, drafter.name(), started_at, error);
                None
            }
        }
    }

    // -- PUBLISHING ------------------------------------------------------

    async fn publish(
        &self,
        draft: &IssueDraft,
        record: &mut ProcessRecord,
        cancel: &CancellationToken,
    ) -> PublishOutcome {
        let publisher = self.collaborators.publisher.as_ref();
        let started_at = Timestamp::now();

        let RetryOutcome { result, attempts } = match IssuePayload::from_draft(draft) {
            // Built once so every attempt sends the same issue.
            Ok(payload) => {
                let payload = &payload;
                self.retry
                    .run(Phase::Publishing, cancel, |attempt| async move {
                        tracing::debug!(attempt, "creating issue");
                        publisher.create_issue(payload).await
                    })
                    .await
            }
            Err(source) => RetryOutcome {
                result: Err(PipelineError::Gateway {
                    operation: Phase::Publishing.to_string(),
                    attempts: 0,
                    source,
                }),
                attempts: Vec::new(),
            },
        };

        match result {
            Ok(issue) => {
                tracing::info!(issue = %issue.number, url = %issue.url, "issue published");
                record.set_published_issue(issue.clone());
                record.push_step(ProcessStep::succeeded(
                    Phase::Publishing,
                    publisher.name(),
                    started_at,
                    StepSummary::Published {
                        attempts,
                        issue: Some(issue.clone()),
                    },
                ));
                PublishOutcome::Published(issue)
            }
            Err(PipelineError::Cancelled { .. }) => {
                stage::cancelled(
                    record,
                    Phase::Publishing,
                    Some(StepSummary::Published {
                        attempts,
                        issue: None,
                    }),
                );
                PublishOutcome::Cancelled
            }
            Err(error) => {
                tracing::error!(error = %error, "issue publication failed");
                record.push_step(ProcessStep::failed(
                    Phase::Publishing,
                    publisher.name(),
                    started_at,
                    error.to_string(),
                    Some(StepSummary::Published {
                        attempts,
                        issue: None,
                    }),
                ));
                PublishOutcome::Failed(error)
            }
        }
    }

    // -- NOTIFYING -------------------------------------------------------

    /// Sends `message`. Returns `false` when the process was cancelled and no
    /// issue had been published.
    ///
    /// Delivery failure is recorded on the step and the record, never fatal.
    /// Cancellation after a successful publication is treated the same way.
    async fn notify(
        &self,
        message: &NotificationMessage,
        record: &mut ProcessRecord,
        cancel: &CancellationToken,
    ) -> bool {
        let notifier = self.collaborators.notifier.as_ref();
        let started_at = Timestamp::now();
        let about_failure = matches!(message.kind, NotificationKind::PublicationFailed { .. });

        let RetryOutcome { result, attempts } = if cancel.is_cancelled() {
            RetryOutcome {
                result: Err(PipelineError::Cancelled {
                    phase: Phase::Notifying.to_string(),
                }),
                attempts: Vec::new(),
            }
        } else {
            self.retry
                .run(Phase::Notifying, cancel, |attempt| async move {
                    tracing::debug!(attempt, "sending notification");
                    notifier.send(message).await
                })
                .await
        };
        let attempt_count = attempts.len() as u32;
        let summary = StepSummary::Notified {
            attempts,
            about_failure,
        };

        match result {
            Ok(_receipt) => {
                tracing::info!(attempts = attempt_count, "notification delivered");
                record.set_notification(NotificationOutcome {
                    delivered: true,
                    attempts: attempt_count,
                    error: None,
                });
                record.push_step(ProcessStep::succeeded(
                    Phase::Notifying,
                    notifier.name(),
                    started_at,
                    summary,
                ));
                true
            }
            Err(error) => {
                record.set_notification(NotificationOutcome {
                    delivered: false,
                    attempts: attempt_count,
                    error: Some(error.to_string()),
                });
                let was_cancelled = matches!(error, PipelineError::Cancelled { .. });
                if was_cancelled && about_failure {
                    stage::cancelled(record, Phase::Notifying, Some(summary));
                    return false;
                }
                let collaborator = if was_cancelled {
                    tracing::warn!("process cancelled after publication, notification abandoned");
                    stage::ORCHESTRATOR
                } else {
                    tracing::warn!(error = %error, "notification failed");
                    notifier.name()
                };
                record.push_step(ProcessStep::failed(
                    Phase::Notifying,
                    collaborator,
                    started_at,
                    error.to_string(),
                    Some(summary),
                ));
                true
            }
        }
    }
}

enum PublishOutcome {
    Published(PublishedIssue),
    Failed(PipelineError),
    Cancelled,
}

/// First section of the draft, trimmed for a chat message.
fn summarize(draft: &IssueDraft) -> String {
    let text = draft
        .sections
        .first()
        .map(|s| s.content.trim())
        .unwrap_or_default();
    if text.chars().count() <= NOTIFICATION_SUMMARY_CHARS {
        return text.to_string();
    }
    let mut short: String = text.chars().take(NOTIFICATION_SUMMARY_CHARS - 1).collect();
    short.push('…');
    short
}
