//! Properties every record must satisfy, checked over randomly scripted runs.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::*;
use pipeline::{
    AttemptStatus, CollaboratorError, GatewayError, NotificationReceipt, Phase, ProcessRecord,
    PublishedIssue, Severity, TerminalResult,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
enum Reply {
    Ok,
    RateLimited,
    Unavailable,
    Rejected,
}

impl Reply {
    fn error(self) -> Option<GatewayError> {
        match self {
            Reply::Ok => None,
            Reply::RateLimited => Some(GatewayError::rate_limited("slow down", None)),
            Reply::Unavailable => Some(GatewayError::from_status(503, "unavailable")),
            Reply::Rejected => Some(GatewayError::from_status(400, "bad request")),
        }
    }

    fn publish(self) -> Result<PublishedIssue, GatewayError> {
        self.error().map_or_else(|| Ok(issue(1)), Err)
    }

    fn notify(self) -> Result<NotificationReceipt, GatewayError> {
        self.error().map_or_else(|| Ok(NotificationReceipt::default()), Err)
    }
}

fn reply() -> impl Strategy<Value = Reply> {
    prop_oneof![
        Just(Reply::Ok),
        Just(Reply::RateLimited),
        Just(Reply::Unavailable),
        Just(Reply::Rejected),
    ]
}

/// A content collaborator that misbehaves for the whole run.
#[derive(Debug, Clone, Copy)]
enum Fault {
    None,
    DrafterFails,
    ReviewerFails,
    ReviewerApprovesAnyway,
    RefinerFails,
    RefinerBlank,
}

fn fault() -> impl Strategy<Value = Fault> {
    prop_oneof![
        4 => Just(Fault::None),
        1 => Just(Fault::DrafterFails),
        1 => Just(Fault::ReviewerFails),
        1 => Just(Fault::ReviewerApprovesAnyway),
        1 => Just(Fault::RefinerFails),
        1 => Just(Fault::RefinerBlank),
    ]
}

fn severity() -> impl Strategy<Value = Option<Severity>> {
    prop_oneof![
        Just(None),
        Just(Some(Severity::Low)),
        Just(Some(Severity::Medium)),
        Just(Some(Severity::High)),
        Just(Some(Severity::Critical)),
    ]
}

#[derive(Debug, Clone)]
struct Run {
    is_bug: bool,
    confidence: f64,
    severity: Option<Severity>,
    max_iterations: u32,
    reviews: Vec<(f64, bool)>,
    publishes: Vec<Reply>,
    notifies: Vec<Reply>,
    fault: Fault,
}

fn run() -> impl Strategy<Value = Run> {
    (
        any::<bool>(),
        0.0..=1.0f64,
        severity(),
        1u32..=4,
        prop::collection::vec((0.0..=10.0f64, any::<bool>()), 1..5),
        prop::collection::vec(reply(), 1..4),
        prop::collection::vec(reply(), 1..4),
        fault(),
    )
        .prop_map(
            |(is_bug, confidence, severity, max_iterations, reviews, publishes, notifies, fault)| {
                Run {
                    is_bug,
                    confidence,
                    severity,
                    max_iterations,
                    reviews,
                    publishes,
                    notifies,
                    fault,
                }
            },
        )
}

struct Observed {
    record: ProcessRecord,
    max_iterations: u32,
    publish_calls: u32,
}

fn execute(run: &Run) -> Observed {
    let mut harness = Harness::happy();
    harness.config.review.max_iterations = run.max_iterations;
    harness.classifier = Arc::new(ScriptedClassifier(Ok(classification(
        run.is_bug,
        run.confidence,
        run.severity,
    ))));
    harness.reviewer = Arc::new(ScriptedReviewer::new(&run.reviews));
    match run.fault {
        Fault::None => {}
        Fault::DrafterFails => {
            harness.drafter = Arc::new(FixedDrafter::returning(Err(CollaboratorError::failed(
                "fixed-drafter",
                "boom",
            ))));
        }
        Fault::ReviewerFails => {
            harness.reviewer = Arc::new(ScriptedReviewer::failing(CollaboratorError::failed(
                "scripted-reviewer",
                "boom",
            )));
        }
        Fault::ReviewerApprovesAnyway => {
            harness.reviewer = Arc::new(ScriptedReviewer::approving_anyway(3.0));
        }
        Fault::RefinerFails => {
            harness.refiner = Arc::new(CountingRefiner {
                fail: true,
                ..CountingRefiner::default()
            });
        }
        Fault::RefinerBlank => {
            harness.refiner = Arc::new(CountingRefiner {
                blank: true,
                ..CountingRefiner::default()
            });
        }
    }
    harness.publisher = Arc::new(ScriptedPublisher::new(
        run.publishes.iter().map(|r| r.publish()).collect(),
    ));
    harness.notifier = Arc::new(ScriptedNotifier::new(
        run.notifies.iter().map(|r| r.notify()).collect(),
    ));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let record = runtime.block_on(
        harness
            .orchestrator()
            .process(ERROR_LOG, &CancellationToken::new()),
    );
    Observed {
        record,
        max_iterations: run.max_iterations,
        publish_calls: harness.publisher.calls.load(Ordering::SeqCst),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_phase_history_is_a_legal_path(run in run()) {
        let observed = execute(&run);
        prop_assert!(observed.record.is_frozen());
        prop_assert!(observed.record.has_valid_history());
    }

    #[test]
    fn prop_refinements_bounded_by_iterations(run in run()) {
        let observed = execute(&run);
        let refinements = observed.record.steps_in(Phase::Refining).count() as u32;
        prop_assert!(refinements < observed.max_iterations);
    }

    #[test]
    fn prop_at_most_one_successful_publish(run in run()) {
        let observed = execute(&run);
        let successes = observed
            .record
            .creation_attempts()
            .iter()
            .filter(|a| a.status == AttemptStatus::Success)
            .count();
        prop_assert!(successes <= 1);
        prop_assert_eq!(observed.publish_calls as usize, observed.record.creation_attempts().len());
        if successes == 1 {
            prop_assert_eq!(
                observed.record.creation_attempts().last().map(|a| a.status),
                Some(AttemptStatus::Success)
            );
        }
    }

    #[test]
    fn prop_notification_never_undoes_publication(run in run()) {
        let observed = execute(&run);
        if observed.record.published_issue().is_some() {
            prop_assert_eq!(observed.record.terminal_result(), Some(TerminalResult::Success));
        }
    }

    #[test]
    fn prop_content_faults_never_publish(run in run()) {
        let observed = execute(&run);
        // Refiner faults only bite when a refinement is needed.
        let faulty = !matches!(run.fault, Fault::None | Fault::RefinerFails | Fault::RefinerBlank);
        let skipped = matches!(
            observed.record.terminal_result(),
            Some(TerminalResult::SkippedNotABug | TerminalResult::SkippedLowPriority)
        );
        if faulty && !skipped {
            prop_assert_eq!(observed.record.terminal_result(), Some(TerminalResult::Failed));
            prop_assert_eq!(observed.publish_calls, 0);
        }
    }

    #[test]
    fn prop_audit_trail_is_complete(run in run()) {
        let observed = execute(&run);
        let record = &observed.record;
        prop_assert!(!record.steps().is_empty());
        let finished_at = record.finished_at().expect("record is frozen");
        let last = record.steps().last().unwrap();
        prop_assert!(last.finished_at <= finished_at);
    }
}
