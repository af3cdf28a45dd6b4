//! Step execution: skip-if-done, timed invocation, checkpoint append.

use async_trait::async_trait;
use docpipe_session::{Session, SessionStore};
use docpipe_utils::error::DocpipeError;
use docpipe_utils::types::StepId;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Successful output of a step collaborator.
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Opaque output locations the step produced. Empty for no-op
    /// completions (e.g. the optional design source was absent).
    pub output_refs: Vec<String>,
}

impl StepOutput {
    /// Output carrying the given refs.
    #[must_use]
    pub fn with_refs(output_refs: Vec<String>) -> Self {
        Self { output_refs }
    }

    /// A no-op success: the step completed without producing anything. It
    /// still gets a checkpoint so the ordering invariant stays uniform.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A step collaborator rejected.
///
/// The message is surfaced verbatim to the caller; collaborators are
/// expected to supply actionable detail. `retryable` is the collaborator's
/// own classification — the engine records it but the caller decides what
/// to do with it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StepFailure {
    pub message: String,
    pub retryable: bool,
}

impl StepFailure {
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// One pipeline stage's real work, out of scope for the engine.
///
/// Implementations receive the session (for its id, source refs, and
/// config) and return output refs on success. They are long-running opaque
/// async calls; the engine cannot and does not interrupt them mid-flight.
#[async_trait]
pub trait StepCollaborator: Send + Sync {
    async fn execute(&self, session: &Session) -> Result<StepOutput, StepFailure>;
}

/// What [`execute_step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A checkpoint already existed; nothing ran, nothing changed.
    Skipped,
    /// The collaborator succeeded and a checkpoint was appended and
    /// persisted.
    Completed { duration_ms: u64 },
}

/// Run exactly one named step against the session.
///
/// 1. Skip (no side effects) if a checkpoint for `step` exists.
/// 2. Otherwise invoke the collaborator, timing it.
/// 3. On success, append a checkpoint and persist the session.
/// 4. On failure, propagate without touching `checkpoints` — the session
///    remains resumable at the same step.
///
/// # Errors
/// `Step` with the collaborator's error verbatim; `Invariant` if the append
/// is rejected; `Validation`/`Storage` from the persist.
pub async fn execute_step(
    store: &SessionStore,
    session: &mut Session,
    step: StepId,
    collaborator: &dyn StepCollaborator,
) -> Result<StepOutcome, DocpipeError> {
    if session.has_checkpoint(step) {
        debug!(session_id = %session.id, step = %step, "checkpoint exists, skipping");
        return Ok(StepOutcome::Skipped);
    }

    info!(session_id = %session.id, step = %step, "step starting");
    let started = Instant::now();

    let output = collaborator
        .execute(session)
        .await
        .map_err(|failure| DocpipeError::Step {
            session_id: session.id.clone(),
            step,
            retryable: failure.retryable,
            source: anyhow::Error::new(failure),
        })?;

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    session.append_checkpoint(step, output.output_refs, duration_ms)?;
    store.write_session(session)?;

    info!(session_id = %session.id, step = %step, duration_ms, "step complete");
    Ok(StepOutcome::Completed { duration_ms })
}
