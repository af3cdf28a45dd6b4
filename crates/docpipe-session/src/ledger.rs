//! Checkpoint ledger operations embedded in the session record.
//!
//! The ledger decides skip-or-run for each step and records completion.
//! Appends enforce uniqueness, definition order, and the capacity bound at
//! the door; callers that want idempotency check [`Session::has_checkpoint`]
//! first.

use crate::model::{Checkpoint, Session};
use chrono::Utc;
use docpipe_utils::error::InvariantViolation;
use docpipe_utils::types::StepId;

impl Session {
    /// True iff a checkpoint for `step` already exists.
    ///
    /// This is the only resume signal: a checkpointed step is done and must
    /// not run again.
    #[must_use]
    pub fn has_checkpoint(&self, step: StepId) -> bool {
        self.checkpoints.iter().any(|c| c.step == step)
    }

    /// Append a checkpoint for a completed step.
    ///
    /// Advances `current_step` to the appended step and refreshes
    /// `updated_at`. The caller persists the session afterwards.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if a checkpoint for `step` already
    /// exists, if appending would break definition order, or if the ledger
    /// is already full.
    pub fn append_checkpoint(
        &mut self,
        step: StepId,
        output_refs: Vec<String>,
        duration_ms: u64,
    ) -> Result<&Checkpoint, InvariantViolation> {
        if self.checkpoints.len() >= StepId::COUNT {
            return Err(InvariantViolation::LedgerFull {
                len: self.checkpoints.len(),
                max: StepId::COUNT,
            });
        }
        if let Some(last) = self.checkpoints.last() {
            if step == last.step {
                return Err(InvariantViolation::DuplicateCheckpoint { step });
            }
            if step.index() < last.step.index() {
                return Err(InvariantViolation::OutOfOrder {
                    step,
                    last: last.step,
                });
            }
        }

        self.checkpoints.push(Checkpoint {
            step,
            timestamp: Utc::now(),
            output_refs,
            duration_ms,
        });
        self.current_step = step;
        self.touch();

        Ok(self.checkpoints.last().expect("just pushed"))
    }
}
