//! Session and checkpoint data model.

use chrono::{DateTime, Utc};
use docpipe_utils::error::ValidationError;
use docpipe_utils::types::{SessionStatus, StepId};
use serde::{Deserialize, Serialize};

/// External inputs for a session. Opaque to the orchestrator; only the step
/// collaborators interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRefs {
    /// Primary document source.
    pub document: String,
    /// Optional design source. Steps that need it no-op succeed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<String>,
}

/// Execution parameters captured at session creation and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Soft time budget for a whole run, in milliseconds.
    pub deadline_ms: u64,
    /// Iteration cap handed through to step collaborators.
    pub max_iterations: u32,
}

impl SessionConfig {
    /// Default soft deadline: 30 minutes.
    pub const DEFAULT_DEADLINE_MS: u64 = 30 * 60 * 1000;

    /// Default iteration cap for collaborators.
    pub const DEFAULT_MAX_ITERATIONS: u32 = 3;
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline_ms: Self::DEFAULT_DEADLINE_MS,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Immutable record of one completed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The step this checkpoint proves complete. Unique within a session.
    pub step: StepId,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
    /// Opaque output locations produced by the step. May be empty for
    /// no-op completions (e.g. an optional source was absent).
    pub output_refs: Vec<String>,
    /// Wall-clock time spent in the step.
    pub duration_ms: u64,
}

/// The durable state entity for one end-to-end pipeline run.
///
/// Persisted after every checkpoint append and on every status transition.
/// The checkpoint list is the only resume signal: a step is done iff a
/// checkpoint with its name exists. There is no partial-step state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique id, generated at creation, immutable.
    pub id: String,
    /// The step the session is positioned at; advances with appends.
    pub current_step: StepId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every persisted mutation.
    pub updated_at: DateTime<Utc>,
    pub source_refs: SourceRefs,
    /// Append-only, at most one entry per step, bounded to [`StepId::COUNT`].
    pub checkpoints: Vec<Checkpoint>,
    pub config: SessionConfig,
}

impl Session {
    /// Create a fresh session positioned at the first step.
    #[must_use]
    pub fn new(source_refs: SourceRefs, config: SessionConfig) -> Self {
        let now = Utc::now();
        Self {
            id: generate_session_id(now),
            current_step: StepId::ALL[0],
            status: SessionStatus::InProgress,
            created_at: now,
            updated_at: now,
            source_refs,
            checkpoints: Vec::new(),
            config,
        }
    }

    /// Refresh `updated_at`. Call before persisting any mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Steps with a checkpoint, in completion order.
    #[must_use]
    pub fn completed_steps(&self) -> Vec<StepId> {
        self.checkpoints.iter().map(|c| c.step).collect()
    }

    /// Check the record against its structural invariants.
    ///
    /// Run on every store read and on the serialized bytes before every store
    /// write. A violation is surfaced as-is, never repaired.
    ///
    /// # Errors
    /// Returns the first violated invariant: checkpoint ordering/uniqueness,
    /// the ledger capacity bound, or a status inconsistent with the
    /// checkpoint count.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.checkpoints.len() > StepId::COUNT {
            return Err(ValidationError::TooManyCheckpoints {
                count: self.checkpoints.len(),
                max: StepId::COUNT,
            });
        }

        // Strictly increasing step indices: covers both duplicates and
        // out-of-definition-order entries.
        for pair in self.checkpoints.windows(2) {
            if pair[1].step.index() <= pair[0].step.index() {
                return Err(ValidationError::CheckpointOrder {
                    step: pair[1].step,
                    prev: pair[0].step,
                });
            }
        }

        match self.status {
            SessionStatus::Completed if self.checkpoints.len() != StepId::COUNT => {
                Err(ValidationError::StatusMismatch {
                    status: self.status.to_string(),
                    count: self.checkpoints.len(),
                })
            }
            SessionStatus::Paused if self.checkpoints.len() >= StepId::COUNT => {
                Err(ValidationError::StatusMismatch {
                    status: self.status.to_string(),
                    count: self.checkpoints.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Time-based opaque session id, e.g. `sess-20260823T141502-347`.
fn generate_session_id(now: DateTime<Utc>) -> String {
    format!(
        "sess-{}-{:03}",
        now.format("%Y%m%dT%H%M%S"),
        now.timestamp_subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            SourceRefs {
                document: "doc.pdf".to_string(),
                design: None,
            },
            SessionConfig::default(),
        )
    }

    fn checkpoint(step: StepId) -> Checkpoint {
        Checkpoint {
            step,
            timestamp: Utc::now(),
            output_refs: vec![],
            duration_ms: 1,
        }
    }

    #[test]
    fn fresh_session_is_valid_and_positioned_at_first_step() {
        let s = session();
        assert!(s.id.starts_with("sess-"));
        assert_eq!(s.current_step, StepId::DocExtraction);
        assert_eq!(s.status, SessionStatus::InProgress);
        assert!(s.checkpoints.is_empty());
        s.validate().unwrap();
    }

    #[test]
    fn ordered_checkpoints_validate() {
        let mut s = session();
        s.checkpoints = vec![
            checkpoint(StepId::DocExtraction),
            checkpoint(StepId::DesignExtraction),
            checkpoint(StepId::CrossValidation),
        ];
        s.validate().unwrap();
    }

    #[test]
    fn out_of_order_checkpoints_are_rejected() {
        let mut s = session();
        s.checkpoints = vec![
            checkpoint(StepId::DesignExtraction),
            checkpoint(StepId::DocExtraction),
        ];
        assert!(matches!(
            s.validate(),
            Err(ValidationError::CheckpointOrder { .. })
        ));
    }

    #[test]
    fn duplicate_checkpoints_are_rejected() {
        let mut s = session();
        s.checkpoints = vec![
            checkpoint(StepId::DocExtraction),
            checkpoint(StepId::DocExtraction),
        ];
        assert!(matches!(
            s.validate(),
            Err(ValidationError::CheckpointOrder { .. })
        ));
    }

    #[test]
    fn completed_requires_full_ledger() {
        let mut s = session();
        s.status = SessionStatus::Completed;
        s.checkpoints = vec![checkpoint(StepId::DocExtraction)];
        assert!(matches!(
            s.validate(),
            Err(ValidationError::StatusMismatch { .. })
        ));

        s.checkpoints = StepId::ALL.into_iter().map(checkpoint).collect();
        s.validate().unwrap();
    }

    #[test]
    fn paused_requires_partial_ledger() {
        let mut s = session();
        s.status = SessionStatus::Paused;
        s.checkpoints = StepId::ALL.into_iter().map(checkpoint).collect();
        assert!(matches!(
            s.validate(),
            Err(ValidationError::StatusMismatch { .. })
        ));

        s.checkpoints.pop();
        s.validate().unwrap();
    }

    #[test]
    fn session_round_trips_through_json() {
        let mut s = session();
        s.checkpoints.push(Checkpoint {
            step: StepId::DocExtraction,
            timestamp: Utc::now(),
            output_refs: vec!["steps/doc-extraction/out.json".to_string()],
            duration_ms: 42,
        });

        let json = serde_json::to_string_pretty(&s).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
