//! Standard review engine: objective structural checks combined with a
//! delegated content assessment.
//!
//! The overall score is `0.6 × structural + 0.4 × content` on the 0–10 scale.
//! Structural failures are always reported as improvement instructions, so a
//! good content score can never mask an empty title or a missing label.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    CollaboratorError, ContentReviewer, CriterionScore, IssueDraft, ReviewConfig, ReviewCriterion,
    ReviewEngine, ReviewScore, ReviewVerdict, StructuralThresholds,
};

const STRUCTURAL_WEIGHT: f64 = 0.6;
const CONTENT_WEIGHT: f64 = 0.4;

/// Passing threshold for checks that block approval.
const BLOCKING_THRESHOLD: f64 = 5.0;

/// Outcome of one structural check.
#[derive(Debug, Clone, PartialEq)]
struct Check {
    criterion: ReviewCriterion,
    /// Points deducted from a perfect structural score when the check fails.
    penalty: f64,
    /// Advisory checks are reported but never block approval on their own.
    blocking: bool,
    failure: Option<String>,
}

impl Check {
    fn to_score(&self) -> CriterionScore {
        let (score, comment) = match &self.failure {
            None => (ReviewScore::MAX, "ok".to_string()),
            Some(message) if self.blocking => (0.0, message.clone()),
            Some(message) => (BLOCKING_THRESHOLD, message.clone()),
        };
        CriterionScore {
            criterion: self.criterion,
            score: ReviewScore::clamped(score),
            passing_threshold: if self.blocking { BLOCKING_THRESHOLD } else { 0.0 },
            comment,
        }
    }
}

/// Result of the structural half of a review.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralReport {
    /// 0–10.
    pub score: ReviewScore,
    pub criteria: Vec<CriterionScore>,
    /// One instruction per failed check.
    pub improvements: Vec<String>,
}

/// Runs every objective check against `draft`.
pub fn structural_review(draft: &IssueDraft, thresholds: &StructuralThresholds) -> StructuralReport {
    let title_len = draft.title.trim().chars().count();
    let body = draft.render_body();
    let body_len = body.chars().count();
    let section_count = draft.sections.len()
        + usize::from(!draft.reproduction_steps.is_empty())
        + usize::from(!draft.environment.is_empty());

    let title = if title_len < thresholds.min_title_length {
        Check {
            criterion: ReviewCriterion::TitleClarity,
            penalty: 2.0,
            blocking: true,
            failure: Some(format!(
                "Title is too short ({title_len} chars, minimum {}); describe the failure and where it happens",
                thresholds.min_title_length
            )),
        }
    } else if title_len > thresholds.max_title_length {
        Check {
            criterion: ReviewCriterion::TitleClarity,
            penalty: 1.0,
            blocking: false,
            failure: Some(format!(
                "Title is too long ({title_len} chars, maximum {}); move detail into the body",
                thresholds.max_title_length
            )),
        }
    } else {
        passed(ReviewCriterion::TitleClarity)
    };

    let description = if body_len < thresholds.min_body_length {
        Check {
            criterion: ReviewCriterion::DescriptionCompleteness,
            penalty: 2.5,
            blocking: true,
            failure: Some(format!(
                "Description is too short ({body_len} chars, minimum {}); add context and impact",
                thresholds.min_body_length
            )),
        }
    } else {
        passed(ReviewCriterion::DescriptionCompleteness)
    };

    let structure = if section_count < thresholds.min_sections {
        Check {
            criterion: ReviewCriterion::Structure,
            penalty: 1.5,
            blocking: true,
            failure: Some(format!(
                "Body has {section_count} section(s), minimum {}; split it into headed sections",
                thresholds.min_sections
            )),
        }
    } else {
        passed(ReviewCriterion::Structure)
    };

    let missing: Vec<&str> = thresholds
        .required_labels
        .iter()
        .map(String::as_str)
        .filter(|name| !draft.has_label(name))
        .collect();
    let labels = if missing.is_empty() {
        passed(ReviewCriterion::Labels)
    } else {
        Check {
            criterion: ReviewCriterion::Labels,
            penalty: 1.0,
            blocking: true,
            failure: Some(format!("Add the required label(s): {}", missing.join(", "))),
        }
    };

    let reproduction = if draft.reproduction_steps.is_empty() {
        Check {
            criterion: ReviewCriterion::ReproductionSteps,
            penalty: 0.5,
            blocking: false,
            failure: Some("Add clear steps to reproduce the problem".to_string()),
        }
    } else {
        passed(ReviewCriterion::ReproductionSteps)
    };

    let environment = if draft.environment.is_empty() {
        Check {
            criterion: ReviewCriterion::Environment,
            penalty: 0.5,
            blocking: false,
            failure: Some("Describe the environment where the error occurred".to_string()),
        }
    } else {
        passed(ReviewCriterion::Environment)
    };

    let checks = [title, description, structure, labels, reproduction, environment];
    let deducted: f64 = checks
        .iter()
        .filter(|c| c.failure.is_some())
        .map(|c| c.penalty)
        .sum();

    StructuralReport {
        score: ReviewScore::clamped(ReviewScore::MAX - deducted),
        criteria: checks.iter().map(Check::to_score).collect(),
        improvements: checks.iter().filter_map(|c| c.failure.clone()).collect(),
    }
}

fn passed(criterion: ReviewCriterion) -> Check {
    Check {
        criterion,
        penalty: 0.0,
        blocking: true,
        failure: None,
    }
}

// ---------------------------------------------------------------------------

/// [`ReviewEngine`] combining [`structural_review`] with a [`ContentReviewer`].
pub struct StandardReviewEngine {
    content: Arc<dyn ContentReviewer>,
    config: ReviewConfig,
}

impl StandardReviewEngine {
    pub fn new(content: Arc<dyn ContentReviewer>, config: ReviewConfig) -> Self {
        Self { content, config }
    }
}

#[async_trait]
impl ReviewEngine for StandardReviewEngine {
    fn name(&self) -> &str {
        "standard-review"
    }

    async fn review(&self, draft: &IssueDraft) -> Result<ReviewVerdict, CollaboratorError> {
        let structural = structural_review(draft, &self.config.structure);
        let content = self.content.assess(draft).await?;

        let overall = ReviewScore::clamped(
            STRUCTURAL_WEIGHT * structural.score.as_f64() + CONTENT_WEIGHT * content.score.as_f64(),
        );

        let mut criteria = structural.criteria;
        criteria.extend(
            content
                .criteria
                .into_iter()
                .filter(|c| !c.criterion.is_structural()),
        );

        let mut improvements = structural.improvements;
        for item in content.improvements {
            if !improvements.contains(&item) {
                improvements.push(item);
            }
        }

        let verdict = ReviewVerdict::new(
            overall,
            criteria,
            improvements,
            content.recommend_approval,
            self.config.approval_threshold,
        );
        tracing::debug!(
            structural = structural.score.as_f64(),
            content = content.score.as_f64(),
            overall = overall.as_f64(),
            approved = verdict.approved,
            "draft reviewed"
        );
        Ok(verdict)
    }
}
