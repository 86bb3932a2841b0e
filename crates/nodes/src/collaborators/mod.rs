//! LLM-backed implementations of the content collaborator ports.
//!
//! | Type | Port |
//! |------|------|
//! | [`LlmClassifier`] | [`pipeline::Classifier`] |
//! | [`LlmDrafter`] | [`pipeline::Drafter`] |
//! | [`LlmContentReviewer`] | [`pipeline::ContentReviewer`] (wrapped by `StandardReviewEngine`) |
//! | [`LlmRefiner`] | [`pipeline::Refiner`] |
//!
//! Each one renders a prompt, sends it through the [`crate::LlmGateway`] and
//! converts the JSON reply into a domain value. Replies that parse but break a
//! domain invariant are reported as malformed.

mod classifier;
mod drafter;
mod prompts;
mod refiner;
mod reviewer;

use std::collections::BTreeMap;

use pipeline::{DraftSection, IssueDraft, IssuePriority, Label, LogEntry};
use serde::Deserialize;

pub use classifier::LlmClassifier;
pub use drafter::LlmDrafter;
pub use refiner::LlmRefiner;
pub use reviewer::LlmContentReviewer;

/// Longest stack trace excerpt included in a prompt.
const MAX_TRACE_CHARS: usize = 2000;

/// Draft shape shared by the drafter and refiner replies.
#[derive(Debug, Deserialize)]
struct DraftReply {
    title: String,
    #[serde(default)]
    sections: Vec<DraftSection>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignees: Vec<String>,
    #[serde(default)]
    priority: Option<IssuePriority>,
    #[serde(default)]
    reproduction_steps: Vec<String>,
    #[serde(default)]
    environment: BTreeMap<String, String>,
}

impl DraftReply {
    /// Converts the reply, rejecting drafts without a title or body.
    fn into_draft(self, default_priority: IssuePriority) -> Result<IssueDraft, String> {
        if self.title.trim().is_empty() {
            return Err("draft has an empty title".to_string());
        }
        let sections: Vec<DraftSection> = self
            .sections
            .into_iter()
            .filter(|s| !s.heading.trim().is_empty() && !s.content.trim().is_empty())
            .collect();
        if sections.is_empty() {
            return Err("draft has no body sections".to_string());
        }

        let mut draft = IssueDraft::new(self.title.trim(), self.priority.unwrap_or(default_priority));
        draft.sections = sections;
        for label in self.labels.into_iter().filter_map(Label::new) {
            draft.add_label(label);
        }
        draft.assignees = self.assignees;
        draft.reproduction_steps = self
            .reproduction_steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        draft.environment = self.environment;
        Ok(draft)
    }
}

/// Renders a log for inclusion in a prompt.
fn describe_log(log: &LogEntry) -> String {
    let mut out = format!(
        "Level: {}\nTimestamp: {}\nMessage: {}\n",
        log.level, log.timestamp, log.message
    );
    if let Some(service) = &log.service {
        out.push_str(&format!("Service: {service}\n"));
    }
    if let Some(environment) = &log.environment {
        out.push_str(&format!("Environment: {environment}\n"));
    }
    if let Some(trace) = &log.stack_trace {
        let excerpt: String = trace.chars().take(MAX_TRACE_CHARS).collect();
        out.push_str(&format!("Stack trace:\n{excerpt}\n"));
    }
    out
}

/// Renders a draft for inclusion in a prompt.
fn describe_draft(draft: &IssueDraft) -> String {
    let labels: Vec<&str> = draft.labels().iter().map(Label::as_str).collect();
    format!(
        "Title: {}\nPriority: {}\nLabels: {}\n\n{}",
        draft.title,
        draft.priority,
        labels.join(", "),
        draft.render_body()
    )
}
