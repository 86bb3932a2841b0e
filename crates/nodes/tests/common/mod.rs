//! Scripted collaborators shared by the orchestrator integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nodes::{Collaborators, ProcessOrchestrator};
use pipeline::{
    BugCategory, Classification, Classifier, CollaboratorError, Confidence, Drafter, GatewayError,
    IssueDraft, IssueNumber, IssuePayload, IssuePriority, Label, LogEntry, NotificationGateway,
    NotificationMessage, NotificationReceipt, PipelineConfig, PublicationGateway, PublishedIssue,
    Refiner, RetryConfig, ReviewEngine, ReviewScore, ReviewVerdict, Severity,
};

pub const ERROR_LOG: &str =
    r#"{"level": "error", "message": "NullPointerException in CheckoutService", "service": "checkout"}"#;

pub fn classification(is_bug: bool, confidence: f64, severity: Option<Severity>) -> Classification {
    Classification {
        is_bug,
        confidence: Confidence::new(confidence).unwrap(),
        severity,
        category: BugCategory::Backend,
        rationale: "scripted".into(),
    }
}

pub fn draft() -> IssueDraft {
    IssueDraft::new("Checkout crashes with NullPointerException", IssuePriority::P1)
        .with_section("Summary", "Checkout fails for every customer with an empty cart.")
        .with_label(Label::new("bug").unwrap())
}

pub fn issue(number: u64) -> PublishedIssue {
    PublishedIssue {
        number: IssueNumber::new(number),
        url: format!("https://github.com/acme/shop/issues/{number}"),
        repository: None,
    }
}

/// Config with no retry delay so tests do not wait.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryConfig {
            max_attempts: 3,
            retry_delay_seconds: 0.0,
        },
        ..PipelineConfig::default()
    }
}

// ---------------------------------------------------------------------------

pub struct ScriptedClassifier(pub Result<Classification, CollaboratorError>);

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted-classifier"
    }

    async fn classify(&self, _log: &LogEntry) -> Result<Classification, CollaboratorError> {
        self.0.clone()
    }
}

/// Returns [`draft`] unless given another reply; optionally stalls first.
#[derive(Default)]
pub struct FixedDrafter {
    pub calls: AtomicU32,
    pub reply: Option<Result<IssueDraft, CollaboratorError>>,
    pub delay: Option<Duration>,
}

impl FixedDrafter {
    pub fn returning(reply: Result<IssueDraft, CollaboratorError>) -> Self {
        Self {
            reply: Some(reply),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Drafter for FixedDrafter {
    fn name(&self) -> &str {
        "fixed-drafter"
    }

    async fn draft(
        &self,
        _log: &LogEntry,
        _classification: &Classification,
    ) -> Result<IssueDraft, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().unwrap_or_else(|| Ok(draft()))
    }
}

/// Returns one scripted verdict per call; the last entry repeats.
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<(f64, bool)>>,
    pub calls: AtomicU32,
    /// Raised instead of reviewing.
    pub error: Option<CollaboratorError>,
    /// Marks every verdict approved regardless of its score.
    pub force_approval: bool,
}

impl ScriptedReviewer {
    pub fn new(script: &[(f64, bool)]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            calls: AtomicU32::new(0),
            error: None,
            force_approval: false,
        }
    }

    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(&[(0.0, false)])
        }
    }

    /// Approves a draft scored `score` even when that misses the bar.
    pub fn approving_anyway(score: f64) -> Self {
        Self {
            force_approval: true,
            ..Self::new(&[(score, false)])
        }
    }
}

#[async_trait]
impl ReviewEngine for ScriptedReviewer {
    fn name(&self) -> &str {
        "scripted-reviewer"
    }

    async fn review(&self, _draft: &IssueDraft) -> Result<ReviewVerdict, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let (score, approve) = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                *script.front().unwrap()
            }
        };
        let mut verdict = ReviewVerdict::new(
            ReviewScore::new(score).unwrap(),
            vec![],
            vec!["Add more detail".into()],
            approve,
            7.0,
        );
        if self.force_approval {
            verdict.approved = true;
        }
        Ok(verdict)
    }
}

/// Appends the revision number to the title; optionally fails or returns a
/// draft with no title and no body.
#[derive(Default)]
pub struct CountingRefiner {
    pub calls: AtomicU32,
    pub fail: bool,
    pub blank: bool,
}

#[async_trait]
impl Refiner for CountingRefiner {
    fn name(&self) -> &str {
        "counting-refiner"
    }

    async fn refine(
        &self,
        draft: &IssueDraft,
        _verdict: &ReviewVerdict,
    ) -> Result<IssueDraft, CollaboratorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail {
            return Err(CollaboratorError::failed("counting-refiner", "model unavailable"));
        }
        if self.blank {
            return Ok(IssueDraft::new("", IssuePriority::P3));
        }
        let mut next = draft.clone();
        next.title = format!("{} (rev {n})", draft.title);
        Ok(next)
    }
}

/// Plays back one result per attempt; the last entry repeats.
pub struct ScriptedPublisher {
    script: Mutex<VecDeque<Result<PublishedIssue, GatewayError>>>,
    pub calls: AtomicU32,
    pub payloads: Mutex<Vec<IssuePayload>>,
}

impl ScriptedPublisher {
    pub fn new(script: Vec<Result<PublishedIssue, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(vec![Ok(issue(42))])
    }
}

#[async_trait]
impl PublicationGateway for ScriptedPublisher {
    fn name(&self) -> &str {
        "scripted-publisher"
    }

    async fn create_issue(&self, payload: &IssuePayload) -> Result<PublishedIssue, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().unwrap().clone()
        }
    }
}

pub struct ScriptedNotifier {
    script: Mutex<VecDeque<Result<NotificationReceipt, GatewayError>>>,
    pub calls: AtomicU32,
    pub messages: Mutex<Vec<NotificationMessage>>,
}

impl ScriptedNotifier {
    pub fn new(script: Vec<Result<NotificationReceipt, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(vec![Ok(NotificationReceipt::default())])
    }
}

#[async_trait]
impl NotificationGateway for ScriptedNotifier {
    fn name(&self) -> &str {
        "scripted-notifier"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<NotificationReceipt, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push(message.clone());
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().unwrap().clone()
        }
    }
}

// ---------------------------------------------------------------------------

/// Every collaborator of one test run, kept so tests can inspect call counts.
pub struct Harness {
    pub classifier: Arc<ScriptedClassifier>,
    pub drafter: Arc<FixedDrafter>,
    pub reviewer: Arc<ScriptedReviewer>,
    pub refiner: Arc<CountingRefiner>,
    pub publisher: Arc<ScriptedPublisher>,
    pub notifier: Arc<ScriptedNotifier>,
    pub config: PipelineConfig,
}

impl Harness {
    /// A confirmed high-severity bug that is approved on first review.
    pub fn happy() -> Self {
        Self {
            classifier: Arc::new(ScriptedClassifier(Ok(classification(
                true,
                0.95,
                Some(Severity::High),
            )))),
            drafter: Arc::new(FixedDrafter::default()),
            reviewer: Arc::new(ScriptedReviewer::new(&[(8.5, true)])),
            refiner: Arc::new(CountingRefiner::default()),
            publisher: Arc::new(ScriptedPublisher::succeeding()),
            notifier: Arc::new(ScriptedNotifier::succeeding()),
            config: fast_config(),
        }
    }

    pub fn orchestrator(&self) -> ProcessOrchestrator {
        let collaborators = Collaborators {
            classifier: self.classifier.clone(),
            drafter: self.drafter.clone(),
            review_engine: self.reviewer.clone(),
            refiner: self.refiner.clone(),
            publisher: self.publisher.clone(),
            notifier: self.notifier.clone(),
        };
        ProcessOrchestrator::new(collaborators, self.config.clone()).unwrap()
    }
}
