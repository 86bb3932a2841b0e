use async_trait::async_trait;
use pipeline::{
    CollaboratorError, ContentAssessment, ContentReviewer, CriterionScore, IssueDraft,
    ReviewCriterion, ReviewScore,
};
use serde::Deserialize;

use super::{describe_draft, prompts};
use crate::LlmGateway;

/// Passing threshold applied to every content criterion.
const CONTENT_PASSING_THRESHOLD: f64 = 5.0;

#[derive(Debug, Deserialize)]
struct AssessmentReply {
    score: f64,
    #[serde(default)]
    approve: bool,
    #[serde(default)]
    criteria: Vec<CriterionReply>,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    comments: String,
}

#[derive(Debug, Deserialize)]
struct CriterionReply {
    criterion: ReviewCriterion,
    score: f64,
    #[serde(default)]
    comment: String,
}

/// [`ContentReviewer`] backed by an LLM.
pub struct LlmContentReviewer {
    gateway: LlmGateway,
}

impl LlmContentReviewer {
    pub const NAME: &'static str = "llm-reviewer";

    pub fn new(gateway: LlmGateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ContentReviewer for LlmContentReviewer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn assess(&self, draft: &IssueDraft) -> Result<ContentAssessment, CollaboratorError> {
        let prompt = format!(
            "Review this issue draft.\n\n{}\n\n{}",
            describe_draft(draft),
            prompts::REVIEW_FORMAT
        );
        let reply: AssessmentReply = self
            .gateway
            .complete_json(Self::NAME, prompts::REVIEWER_SYSTEM, prompt)
            .await?;

        let score = ReviewScore::new(reply.score).ok_or_else(|| {
            CollaboratorError::malformed(
                Self::NAME,
                format!("score {} is outside [0, 10]", reply.score),
            )
        })?;
        Ok(ContentAssessment {
            score,
            recommend_approval: reply.approve,
            criteria: reply
                .criteria
                .into_iter()
                .map(|c| CriterionScore {
                    criterion: c.criterion,
                    score: ReviewScore::clamped(c.score),
                    passing_threshold: CONTENT_PASSING_THRESHOLD,
                    comment: c.comment,
                })
                .collect(),
            improvements: reply
                .improvements
                .into_iter()
                .filter(|i| !i.trim().is_empty())
                .collect(),
            comments: reply.comments,
        })
    }
}
