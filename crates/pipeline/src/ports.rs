//! Collaborator port traits and the payload types that cross them.
//!
//! Each role in the pipeline is one trait, resolved at construction time and
//! injected into the orchestrator. Infrastructure crates (`llm`, `github`,
//! `discord`) and the LLM-backed collaborators in `nodes` implement these;
//! tests implement them with scripted in-memory fakes.
//!
//! Collaborators receive read-only views of exactly the data they need. None
//! of them ever sees the process record.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Classification, CollaboratorError, CriterionScore, FailureCause, GatewayError, IssueDraft,
    IssueNumber, LogEntry, MessageId, ProcessId, RepositoryId, ReviewScore, ReviewVerdict,
    Severity,
};

// ---------------------------------------------------------------------------
// Content collaborators
// ---------------------------------------------------------------------------

/// Decides whether a log represents a bug worth pursuing.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Name recorded on the ANALYZING step.
    fn name(&self) -> &str;

    async fn classify(&self, log: &LogEntry) -> Result<Classification, CollaboratorError>;
}

/// Produces the first issue draft for a classified log.
#[async_trait]
pub trait Drafter: Send + Sync {
    fn name(&self) -> &str;

    async fn draft(
        &self,
        log: &LogEntry,
        classification: &Classification,
    ) -> Result<IssueDraft, CollaboratorError>;
}

/// Scores a draft and decides whether it is ready to publish.
#[async_trait]
pub trait ReviewEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, draft: &IssueDraft) -> Result<ReviewVerdict, CollaboratorError>;
}

/// Content half of a review: judgement an objective check cannot make.
#[async_trait]
pub trait ContentReviewer: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(&self, draft: &IssueDraft) -> Result<ContentAssessment, CollaboratorError>;
}

/// Produces an improved draft from a draft and the verdict it received.
#[async_trait]
pub trait Refiner: Send + Sync {
    fn name(&self) -> &str;

    async fn refine(
        &self,
        draft: &IssueDraft,
        verdict: &ReviewVerdict,
    ) -> Result<IssueDraft, CollaboratorError>;
}

/// Result of a [`ContentReviewer`] assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAssessment {
    pub score: ReviewScore,
    pub recommend_approval: bool,
    #[serde(default)]
    pub criteria: Vec<CriterionScore>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub comments: String,
}

// ---------------------------------------------------------------------------
// LLM provider
// ---------------------------------------------------------------------------

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text returned by an [`LlmProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    #[serde(default)]
    pub model: String,
}

/// Text-completion backend used by the LLM-backed collaborators.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, CollaboratorError>;
}

// ---------------------------------------------------------------------------
// Side-effecting gateways
// ---------------------------------------------------------------------------

/// Normalised issue payload handed to the [`PublicationGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
}

impl IssuePayload {
    /// Builds the payload for a draft, rejecting drafts no tracker would accept.
    pub fn from_draft(draft: &IssueDraft) -> Result<Self, GatewayError> {
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(GatewayError::new(
                FailureCause::InvalidPayload,
                "issue title is empty",
            ));
        }
        let body = draft.render_body();
        if body.is_empty() {
            return Err(GatewayError::new(
                FailureCause::InvalidPayload,
                "issue body is empty",
            ));
        }
        Ok(Self {
            title: title.to_string(),
            body,
            labels: draft.labels().iter().map(|l| l.as_str().to_string()).collect(),
            assignees: draft.assignees.clone(),
        })
    }
}

/// Reference to an issue the tracker accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedIssue {
    pub number: IssueNumber,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryId>,
}

/// Idempotent-until-observed "create issue" against an issue tracker.
#[async_trait]
pub trait PublicationGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn create_issue(&self, payload: &IssuePayload) -> Result<PublishedIssue, GatewayError>;
}

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    IssueCreated { issue: PublishedIssue },
    PublicationFailed { error: String },
}

/// Normalised message handed to the [`NotificationGateway`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub process_id: ProcessId,
    pub kind: NotificationKind,
    pub title: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Acknowledgement from the messaging service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

/// Best-effort "send message" against a messaging webhook.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &NotificationMessage)
        -> Result<NotificationReceipt, GatewayError>;
}
