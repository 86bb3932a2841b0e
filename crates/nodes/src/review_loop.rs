//! Bounded review–refinement loop.
//!
//! Each iteration reviews the current draft. An approved draft leaves the loop
//! immediately. On the last allowed iteration a non-approved draft is accepted
//! with reservation when it meets the secondary threshold and fails the
//! process otherwise. Any other non-approved draft is refined and reviewed
//! again. A refiner failure or a refinement without a title or body aborts the
//! loop; neither is treated as a low score.

use std::time::Duration;

use pipeline::{
    CollaboratorError, IssueDraft, Phase, PipelineError, ProcessRecord, ProcessStep, Refiner,
    ReviewConfig, ReviewEngine, StepSummary, Timestamp,
};
use tokio_util::sync::CancellationToken;

use crate::stage;

/// How the loop ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoopOutcome {
    /// The reviewer approved this draft.
    Approved(IssueDraft),
    /// Budget exhausted, but the final score met the secondary threshold.
    AcceptedWithReservation(IssueDraft),
    /// The record has been frozen as failed.
    Aborted,
}

pub(crate) struct ReviewLoop<'a> {
    pub engine: &'a dyn ReviewEngine,
    pub refiner: &'a dyn Refiner,
    pub config: &'a ReviewConfig,
    pub timeout: Duration,
}

impl ReviewLoop<'_> {
    /// Runs the loop starting from the DRAFTING phase.
    pub(crate) async fn run(
        &self,
        mut draft: IssueDraft,
        record: &mut ProcessRecord,
        cancel: &CancellationToken,
    ) -> LoopOutcome {
        let max_iterations = self.config.max_iterations.max(1);

        for iteration in 1..=max_iterations {
            if !stage::enter(record, Phase::Reviewing, cancel) {
                return LoopOutcome::Aborted;
            }

            let started_at = Timestamp::now();
            let reviewed =
                stage::call_collaborator(self.engine.name(), self.timeout, self.engine.review(&draft))
                    .await
                    .and_then(|verdict| {
                        if verdict.is_consistent(self.config.approval_threshold) {
                            Ok(verdict)
                        } else {
                            Err(CollaboratorError::malformed(
                                self.engine.name(),
                                "verdict approves a draft that misses the approval bar",
                            )
                            .into())
                        }
                    });
            let verdict = match reviewed {
                Ok(verdict) => verdict,
                Err(error) => {
                    stage::fail_step(record, self.engine.name(), started_at, error);
                    return LoopOutcome::Aborted;
                }
            };

            tracing::info!(
                iteration,
                max_iterations,
                score = verdict.overall_score.as_f64(),
                approved = verdict.approved,
                "review completed"
            );

            if verdict.approved {
                record.push_step(ProcessStep::succeeded(
                    Phase::Reviewing,
                    self.engine.name(),
                    started_at,
                    StepSummary::Reviewed {
                        iteration,
                        verdict,
                        accepted_with_reservation: false,
                    },
                ));
                return LoopOutcome::Approved(draft);
            }

            if iteration == max_iterations {
                let score = verdict.overall_score;
                let accepted = score.meets(self.config.secondary_threshold);
                let summary = StepSummary::Reviewed {
                    iteration,
                    verdict,
                    accepted_with_reservation: accepted,
                };
                if accepted {
                    tracing::info!(
                        score = score.as_f64(),
                        threshold = self.config.secondary_threshold,
                        "review budget exhausted, accepting with reservation"
                    );
                    record.push_step(ProcessStep::succeeded(
                        Phase::Reviewing,
                        self.engine.name(),
                        started_at,
                        summary,
                    ));
                    return LoopOutcome::AcceptedWithReservation(draft);
                }

                let error = PipelineError::ReviewBudgetExhausted {
                    iterations: iteration,
                    score: score.as_f64(),
                    threshold: self.config.secondary_threshold,
                };
                tracing::warn!(error = %error, "review budget exhausted");
                record.push_step(ProcessStep::failed(
                    Phase::Reviewing,
                    self.engine.name(),
                    started_at,
                    error.to_string(),
                    Some(summary),
                ));
                record.fail(error);
                return LoopOutcome::Aborted;
            }

            record.push_step(ProcessStep::succeeded(
                Phase::Reviewing,
                self.engine.name(),
                started_at,
                StepSummary::Reviewed {
                    iteration,
                    verdict: verdict.clone(),
                    accepted_with_reservation: false,
                },
            ));

            if !stage::enter(record, Phase::Refining, cancel) {
                return LoopOutcome::Aborted;
            }
            let started_at = Timestamp::now();
            let refined = stage::call_collaborator(
                self.refiner.name(),
                self.timeout,
                self.refiner.refine(&draft, &verdict),
            )
            .await
            .and_then(|next| match next.validate() {
                Ok(()) => Ok(next),
                Err(detail) => Err(CollaboratorError::malformed(self.refiner.name(), detail).into()),
            });
            let mut next = match refined {
                Ok(next) => next,
                Err(error) => {
                    stage::fail_step(record, self.refiner.name(), started_at, error);
                    return LoopOutcome::Aborted;
                }
            };
            next.revision = draft.revision + 1;
            next.dedup_labels();
            record.push_step(ProcessStep::succeeded(
                Phase::Refining,
                self.refiner.name(),
                started_at,
                StepSummary::Refined {
                    iteration,
                    draft: next.clone(),
                },
            ));
            draft = next;
        }

        // `max_iterations >= 1` and the final iteration always returns.
        LoopOutcome::Aborted
    }
}
