//! Helpers shared by every stage of the orchestrator: phase entry with the
//! cooperative cancellation check, and timeout-bounded collaborator calls.

use std::future::Future;
use std::time::Duration;

use pipeline::{CollaboratorError, Phase, PipelineError, ProcessRecord, ProcessStep, Timestamp};
use tokio_util::sync::CancellationToken;

/// Name recorded on steps the orchestrator writes itself.
pub(crate) const ORCHESTRATOR: &str = "orchestrator";

/// Moves `record` into `phase`, then checks for cancellation.
///
/// Returns `false` when the process was cancelled; in that case a failed step
/// for `phase` has been appended and the record is frozen.
pub(crate) fn enter(record: &mut ProcessRecord, phase: Phase, cancel: &CancellationToken) -> bool {
    record.advance(phase);
    if cancel.is_cancelled() {
        cancelled(record, phase, None);
        return false;
    }
    true
}

/// Records a cancellation for `phase` and freezes the record as failed.
pub(crate) fn cancelled(
    record: &mut ProcessRecord,
    phase: Phase,
    summary: Option<pipeline::StepSummary>,
) {
    let error = PipelineError::Cancelled {
        phase: phase.to_string(),
    };
    tracing::warn!(%phase, "process cancelled");
    record.push_step(ProcessStep::failed(
        phase,
        ORCHESTRATOR,
        Timestamp::now(),
        error.to_string(),
        summary,
    ));
    record.fail(error);
}

/// Appends a failed step for the current phase and freezes the record.
pub(crate) fn fail_step(
    record: &mut ProcessRecord,
    collaborator: &str,
    started_at: Timestamp,
    error: PipelineError,
) {
    tracing::warn!(phase = %record.phase(), collaborator, error = %error, "stage failed");
    record.push_step(ProcessStep::failed(
        record.phase(),
        collaborator,
        started_at,
        error.to_string(),
        None,
    ));
    record.fail(error);
}

/// Awaits a content collaborator with a timeout.
///
/// A timeout is reported as [`PipelineError::CollaboratorTimeout`] and is never
/// retried.
pub(crate) async fn call_collaborator<T, F>(
    collaborator: &str,
    timeout: Duration,
    call: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(PipelineError::Collaborator(error)),
        Err(_elapsed) => Err(PipelineError::CollaboratorTimeout {
            collaborator: collaborator.to_string(),
            after: timeout,
        }),
    }
}
