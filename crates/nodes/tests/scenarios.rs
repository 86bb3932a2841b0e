//! End-to-end runs of the orchestrator against scripted collaborators.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use nodes::{Collaborators, ProcessOrchestrator};
use pipeline::{
    AttemptStatus, CollaboratorError, GatewayError, IssueDraft, IssuePayload, IssuePriority,
    MetricsAggregator, NotificationKind, Phase, PipelineError, PublicationGateway, PublishedIssue,
    Severity, StepSummary, TerminalResult,
};
use tokio_util::sync::CancellationToken;

fn phases(record: &pipeline::ProcessRecord) -> Vec<Phase> {
    record.steps().iter().map(|s| s.phase).collect()
}

#[tokio::test]
async fn test_happy_path_publishes_and_notifies() {
    let harness = Harness::happy();
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Success));
    assert_eq!(record.phase(), Phase::Completed);
    assert_eq!(
        phases(&record),
        vec![
            Phase::Received,
            Phase::Analyzing,
            Phase::Drafting,
            Phase::Reviewing,
            Phase::Publishing,
            Phase::Notifying,
        ]
    );
    assert!(record.steps().iter().all(|s| s.success));
    assert_eq!(record.published_issue().unwrap().number.as_u64(), 42);
    assert!(record.notification().unwrap().delivered);

    let messages = harness.notifier.messages.lock().unwrap();
    assert!(matches!(messages[0].kind, NotificationKind::IssueCreated { .. }));
    assert_eq!(messages[0].severity, Some(Severity::High));
}

#[tokio::test]
async fn test_critical_bug_reaches_drafting() {
    let mut harness = Harness::happy();
    harness.classifier = Arc::new(ScriptedClassifier(Ok(classification(
        true,
        0.95,
        Some(Severity::Critical),
    ))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.steps_in(Phase::Drafting).count(), 1);
    assert_eq!(harness.drafter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_not_a_bug_is_skipped_before_drafting() {
    let mut harness = Harness::happy();
    harness.classifier = Arc::new(ScriptedClassifier(Ok(classification(
        false,
        0.9,
        Some(Severity::Low),
    ))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::SkippedNotABug));
    assert_eq!(record.phase(), Phase::Skipped);
    assert_eq!(record.steps_in(Phase::Drafting).count(), 0);
    assert_eq!(harness.drafter.calls.load(Ordering::SeqCst), 0);
    assert!(record.skip_rationale().is_some());
    assert_eq!(harness.notifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_low_severity_bug_skipped_when_below_minimum() {
    let mut harness = Harness::happy();
    harness.config.gate.minimum_severity = Severity::Medium;
    harness.classifier = Arc::new(ScriptedClassifier(Ok(classification(
        true,
        0.9,
        Some(Severity::Low),
    ))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(
        record.terminal_result(),
        Some(TerminalResult::SkippedLowPriority)
    );
}

#[tokio::test]
async fn test_budget_exhausted_above_secondary_threshold_is_accepted() {
    let mut harness = Harness::happy();
    harness.reviewer = Arc::new(ScriptedReviewer::new(&[(6.5, false)]));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Success));
    assert_eq!(harness.reviewer.calls.load(Ordering::SeqCst), 3);
    assert_eq!(harness.refiner.calls.load(Ordering::SeqCst), 2);
    assert_eq!(record.steps_in(Phase::Refining).count(), 2);

    let last_review = record.steps_in(Phase::Reviewing).last().unwrap();
    assert!(matches!(
        last_review.summary,
        Some(StepSummary::Reviewed {
            iteration: 3,
            accepted_with_reservation: true,
            ..
        })
    ));

    // The third draft (two refinements) is the one published.
    let payloads = harness.publisher.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0].title.ends_with("(rev 1) (rev 2)"));
}

#[tokio::test]
async fn test_low_final_score_fails_in_reviewing() {
    let mut harness = Harness::happy();
    harness.reviewer = Arc::new(ScriptedReviewer::new(&[(5.5, false), (5.8, false), (4.0, false)]));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    let failure = record.failure().unwrap();
    assert_eq!(failure.phase, Phase::Reviewing);
    assert!(matches!(
        failure.error,
        PipelineError::ReviewBudgetExhausted { iterations: 3, .. }
    ));
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 0);
    assert!(!record.steps().last().unwrap().success);
}

#[tokio::test]
async fn test_rate_limited_twice_then_published() {
    let mut harness = Harness::happy();
    harness.publisher = Arc::new(ScriptedPublisher::new(vec![
        Err(GatewayError::rate_limited("secondary rate limit", None)),
        Err(GatewayError::rate_limited("secondary rate limit", None)),
        Ok(issue(7)),
    ]));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    let attempts = record.creation_attempts();
    assert_eq!(attempts.len(), 3);
    assert_eq!(attempts[0].status, AttemptStatus::RateLimited);
    assert_eq!(attempts[2].status, AttemptStatus::Success);
    assert!(record.steps_in(Phase::Publishing).last().unwrap().success);
    assert_eq!(record.terminal_result(), Some(TerminalResult::Success));
}

#[tokio::test]
async fn test_notification_failure_keeps_success() {
    let mut harness = Harness::happy();
    harness.notifier = Arc::new(ScriptedNotifier::new(vec![Err(GatewayError::from_status(
        404,
        "unknown webhook",
    ))]));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Success));
    assert!(record.notification_degraded());
    assert_eq!(record.notification_attempts().len(), 1);
    assert_eq!(record.notification_attempts()[0].status, AttemptStatus::Failed);
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 1);
    assert!(!record.steps_in(Phase::Notifying).last().unwrap().success);
}

#[tokio::test]
async fn test_publication_failure_is_notified_and_fails() {
    let mut harness = Harness::happy();
    harness.publisher = Arc::new(ScriptedPublisher::new(vec![Err(GatewayError::from_status(
        422,
        "validation failed",
    ))]));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(record.failure().unwrap().phase, Phase::Publishing);
    assert_eq!(record.creation_attempts().len(), 1);

    let messages = harness.notifier.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(matches!(
        messages[0].kind,
        NotificationKind::PublicationFailed { ref error } if error.contains("validation failed")
    ));
}

#[tokio::test]
async fn test_refiner_failure_aborts_loop() {
    let mut harness = Harness::happy();
    harness.reviewer = Arc::new(ScriptedReviewer::new(&[(5.0, false)]));
    harness.refiner = Arc::new(CountingRefiner {
        fail: true,
        ..CountingRefiner::default()
    });
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(record.failure().unwrap().phase, Phase::Refining);
    assert_eq!(harness.reviewer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_refinement_fails_in_refining() {
    let mut harness = Harness::happy();
    harness.config.review.max_iterations = 2;
    harness.reviewer = Arc::new(ScriptedReviewer::new(&[(5.0, false), (6.5, false)]));
    harness.refiner = Arc::new(CountingRefiner {
        blank: true,
        ..CountingRefiner::default()
    });
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    let failure = record.failure().unwrap();
    assert_eq!(failure.phase, Phase::Refining);
    assert!(matches!(
        failure.error,
        PipelineError::Collaborator(CollaboratorError::Malformed { .. })
    ));
    assert_eq!(harness.reviewer.calls.load(Ordering::SeqCst), 1);
    assert!(record.steps_in(Phase::Refining).all(|s| !s.success));
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_draft_without_body_fails_in_drafting() {
    let mut harness = Harness::happy();
    harness.drafter = Arc::new(FixedDrafter::returning(Ok(IssueDraft::new(
        "Checkout crashes",
        IssuePriority::P1,
    ))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    let failure = record.failure().unwrap();
    assert_eq!(failure.phase, Phase::Drafting);
    assert!(matches!(
        failure.error,
        PipelineError::Collaborator(CollaboratorError::Malformed { .. })
    ));
    assert_eq!(harness.reviewer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_drafter_error_fails_in_drafting() {
    let mut harness = Harness::happy();
    harness.drafter = Arc::new(FixedDrafter::returning(Err(CollaboratorError::failed(
        "fixed-drafter",
        "context window exceeded",
    ))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(record.failure().unwrap().phase, Phase::Drafting);
    let step = record.steps().last().unwrap();
    assert_eq!(step.phase, Phase::Drafting);
    assert!(step.error.as_deref().unwrap().contains("context window exceeded"));
    assert_eq!(harness.reviewer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_review_engine_error_fails_in_reviewing() {
    let mut harness = Harness::happy();
    harness.reviewer = Arc::new(ScriptedReviewer::failing(CollaboratorError::failed(
        "scripted-reviewer",
        "model overloaded",
    )));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(record.failure().unwrap().phase, Phase::Reviewing);
    assert_eq!(harness.reviewer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.refiner.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_approval_below_bar_is_malformed() {
    let mut harness = Harness::happy();
    harness.reviewer = Arc::new(ScriptedReviewer::approving_anyway(6.0));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    let failure = record.failure().unwrap();
    assert_eq!(failure.phase, Phase::Reviewing);
    assert!(matches!(
        failure.error,
        PipelineError::Collaborator(CollaboratorError::Malformed { .. })
    ));
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_collaborator_timeout_is_not_retried() {
    let mut harness = Harness::happy();
    harness.config.timeouts.collaborator_seconds = 10.0;
    harness.drafter = Arc::new(FixedDrafter::slow(Duration::from_secs(120)));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    let failure = record.failure().unwrap();
    assert_eq!(failure.phase, Phase::Drafting);
    assert!(matches!(
        failure.error,
        PipelineError::CollaboratorTimeout { ref collaborator, .. } if collaborator == "fixed-drafter"
    ));
    assert_eq!(harness.drafter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_classifier_error_falls_back_when_enabled() {
    let mut harness = Harness::happy();
    harness.config.analysis.fallback_on_classifier_error = true;
    harness.classifier = Arc::new(ScriptedClassifier(Err(CollaboratorError::failed(
        "scripted-classifier",
        "model overloaded",
    ))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    let step = record.steps_in(Phase::Analyzing).next().unwrap();
    assert!(step.success);
    assert!(step.error.as_deref().unwrap().contains("model overloaded"));
    assert!(matches!(
        step.summary,
        Some(StepSummary::Classified { fallback: true, .. })
    ));
    // An error-level log is treated as a medium-severity bug.
    assert_eq!(record.classification().unwrap().severity, Some(Severity::Medium));
}

#[tokio::test]
async fn test_classifier_error_fails_without_fallback() {
    let mut harness = Harness::happy();
    harness.classifier = Arc::new(ScriptedClassifier(Err(CollaboratorError::failed(
        "scripted-classifier",
        "model overloaded",
    ))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(record.failure().unwrap().phase, Phase::Analyzing);
}

#[tokio::test]
async fn test_bug_without_severity_is_malformed() {
    let mut harness = Harness::happy();
    harness.classifier = Arc::new(ScriptedClassifier(Ok(classification(true, 0.9, None))));
    let record = harness
        .orchestrator()
        .process(ERROR_LOG, &CancellationToken::new())
        .await;

    assert!(matches!(
        record.failure().unwrap().error,
        PipelineError::Collaborator(CollaboratorError::Malformed { .. })
    ));
}

#[tokio::test]
async fn test_empty_input_fails_at_intake() {
    let harness = Harness::happy();
    let record = harness
        .orchestrator()
        .process("   ", &CancellationToken::new())
        .await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(phases(&record), vec![Phase::Received]);
    assert!(matches!(
        record.failure().unwrap().error,
        PipelineError::Validation(_)
    ));
}

#[tokio::test]
async fn test_cancelled_before_start_records_failed_step() {
    let harness = Harness::happy();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let record = harness.orchestrator().process(ERROR_LOG, &cancel).await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(phases(&record), vec![Phase::Received, Phase::Analyzing]);
    assert!(matches!(
        record.failure().unwrap().error,
        PipelineError::Cancelled { .. }
    ));
    assert_eq!(harness.drafter.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_during_publish_retry_keeps_attempts() {
    let mut harness = Harness::happy();
    harness.config.retry.retry_delay_seconds = 30.0;
    harness.publisher = Arc::new(ScriptedPublisher::new(vec![Err(GatewayError::from_status(
        503,
        "unavailable",
    ))]));
    let orchestrator = harness.orchestrator();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });
    let record = orchestrator.process(ERROR_LOG, &cancel).await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Failed));
    assert_eq!(record.failure().unwrap().phase, Phase::Publishing);
    assert_eq!(record.creation_attempts().len(), 1);
    assert_eq!(harness.notifier.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_during_notify_retry_keeps_success() {
    let mut harness = Harness::happy();
    harness.config.retry.retry_delay_seconds = 30.0;
    harness.notifier = Arc::new(ScriptedNotifier::new(vec![Err(GatewayError::from_status(
        503,
        "unavailable",
    ))]));
    let orchestrator = harness.orchestrator();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();
    });
    let record = orchestrator.process(ERROR_LOG, &cancel).await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Success));
    assert_eq!(record.published_issue().unwrap().number.as_u64(), 42);
    assert!(record.notification_degraded());
    assert_eq!(record.notification_attempts().len(), 1);
    assert_eq!(harness.notifier.calls.load(Ordering::SeqCst), 1);
    let step = record.steps().last().unwrap();
    assert_eq!(step.phase, Phase::Notifying);
    assert!(!step.success);
    assert!(record.has_valid_history());
}

/// Publishes, then cancels the process before notification starts.
struct CancellingPublisher(CancellationToken);

#[async_trait]
impl PublicationGateway for CancellingPublisher {
    fn name(&self) -> &str {
        "cancelling-publisher"
    }

    async fn create_issue(&self, _payload: &IssuePayload) -> Result<PublishedIssue, GatewayError> {
        self.0.cancel();
        Ok(issue(9))
    }
}

#[tokio::test]
async fn test_cancelled_after_publish_skips_notification_but_succeeds() {
    let harness = Harness::happy();
    let cancel = CancellationToken::new();
    let collaborators = Collaborators {
        classifier: harness.classifier.clone(),
        drafter: harness.drafter.clone(),
        review_engine: harness.reviewer.clone(),
        refiner: harness.refiner.clone(),
        publisher: Arc::new(CancellingPublisher(cancel.clone())),
        notifier: harness.notifier.clone(),
    };
    let orchestrator = ProcessOrchestrator::new(collaborators, harness.config.clone()).unwrap();
    let record = orchestrator.process(ERROR_LOG, &cancel).await;

    assert_eq!(record.terminal_result(), Some(TerminalResult::Success));
    assert!(record.notification_degraded());
    assert!(record.notification_attempts().is_empty());
    assert_eq!(harness.notifier.calls.load(Ordering::SeqCst), 0);
    assert!(record.has_valid_history());
}

#[tokio::test]
async fn test_concurrent_processes_share_metrics() {
    let harness = Harness::happy();
    let metrics = Arc::new(MetricsAggregator::default());
    let orchestrator = Arc::new(harness.orchestrator().with_metrics(metrics.clone()));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let orchestrator = orchestrator.clone();
        tasks.push(tokio::spawn(async move {
            orchestrator
                .process(ERROR_LOG, &CancellationToken::new())
                .await
        }));
    }
    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().process_id());
    }

    assert_eq!(ids.len(), 8);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.total_processed, 8);
    assert_eq!(snapshot.issues_created, 8);
}
