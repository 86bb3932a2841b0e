use async_trait::async_trait;
use pipeline::{
    Classification, CollaboratorError, Drafter, IssueDraft, IssuePriority, Label, LogEntry,
};

use super::{describe_log, prompts, DraftReply};
use crate::LlmGateway;

/// [`Drafter`] backed by an LLM.
///
/// Adds the `bug` label for confirmed bugs and fills the environment from the
/// log's own metadata where the model left it out.
pub struct LlmDrafter {
    gateway: LlmGateway,
}

impl LlmDrafter {
    pub const NAME: &'static str = "llm-drafter";

    pub fn new(gateway: LlmGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Drafter for LlmDrafter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn draft(
        &self,
        log: &LogEntry,
        classification: &Classification,
    ) -> Result<IssueDraft, CollaboratorError> {
        let severity = classification.effective_severity();
        let prompt = format!(
            "Write a GitHub issue for this log.\n\n{}\nClassification: severity {}, category {:?}, confidence {}\nRationale: {}\n\n{}",
            describe_log(log),
            severity,
            classification.category,
            classification.confidence,
            classification.rationale,
            prompts::DRAFT_FORMAT
        );
        let reply: DraftReply = self
            .gateway
            .complete_json(Self::NAME, prompts::DRAFTER_SYSTEM, prompt)
            .await?;
        let mut draft = reply
            .into_draft(IssuePriority::for_severity(severity))
            .map_err(|detail| CollaboratorError::malformed(Self::NAME, detail))?;

        if classification.is_bug {
            if let Some(label) = Label::new("bug") {
                draft.add_label(label);
            }
        }
        if let Some(service) = &log.service {
            draft
                .environment
                .entry("service".to_string())
                .or_insert_with(|| service.clone());
        }
        if let Some(environment) = &log.environment {
            draft
                .environment
                .entry("environment".to_string())
                .or_insert_with(|| environment.clone());
        }
        Ok(draft)
    }
}
