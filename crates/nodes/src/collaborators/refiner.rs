use async_trait::async_trait;
use pipeline::{CollaboratorError, IssueDraft, Refiner, ReviewVerdict};

use super::{describe_draft, prompts, DraftReply};
use crate::LlmGateway;

/// [`Refiner`] backed by an LLM.
///
/// Produces a new draft value. Priority is fixed at drafting time; labels and
/// assignees of the previous draft are carried over so a refinement never
/// drops them.
pub struct LlmRefiner {
    gateway: LlmGateway,
}

impl LlmRefiner {
    pub const NAME: &'static str = "llm-refiner";

    pub fn new(gateway: LlmGateway) -> Self {
        Self { gateway }
    }
}

fn feedback(verdict: &ReviewVerdict) -> String {
    let mut out = format!("Overall score: {}\n", verdict.overall_score);
    for criterion in verdict.failing_criteria() {
        out.push_str(&format!(
            "- {:?} scored {}: {}\n",
            criterion.criterion, criterion.score, criterion.comment
        ));
    }
    if !verdict.improvements.is_empty() {
        out.push_str("Improvements required:\n");
        for (i, item) in verdict.improvements.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, item));
        }
    }
    out
}

#[async_trait]
impl Refiner for LlmRefiner {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn refine(
        &self,
        draft: &IssueDraft,
        verdict: &ReviewVerdict,
    ) -> Result<IssueDraft, CollaboratorError> {
        let prompt = format!(
            "Improve this issue draft.\n\nCurrent draft:\n{}\n\nReviewer feedback:\n{}\n{}",
            describe_draft(draft),
            feedback(verdict),
            prompts::DRAFT_FORMAT
        );
        let reply: DraftReply = self
            .gateway
            .complete_json(Self::NAME, prompts::REFINER_SYSTEM, prompt)
            .await?;
        let mut refined = reply
            .into_draft(draft.priority)
            .map_err(|detail| CollaboratorError::malformed(Self::NAME, detail))?;
        refined.priority = draft.priority;

        for label in draft.labels() {
            refined.add_label(label.clone());
        }
        for assignee in &draft.assignees {
            if !refined.assignees.contains(assignee) {
                refined.assignees.push(assignee.clone());
            }
        }
        if refined.environment.is_empty() {
            refined.environment = draft.environment.clone();
        }
        Ok(refined)
    }
}
