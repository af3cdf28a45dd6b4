//! Error taxonomy for docpipe.
//!
//! `DocpipeError` is the primary error type returned by docpipe operations.
//! Errors are organized by category:
//!
//! | Category | Meaning |
//! |----------|---------|
//! | `Validation` | A persisted session record fails validation on read |
//! | `Invariant` | A checkpoint append would violate ordering or uniqueness |
//! | `Step` | A step collaborator failed; may be retryable |
//! | `Storage` | The atomic store could not write or rename |
//!
//! Deadline expiry is deliberately absent here: it is a normal outcome of a
//! run (a paused summary), never an error.
//!
//! Library code returns `DocpipeError` and does not call
//! `std::process::exit()`.

use crate::types::StepId;
use thiserror::Error;

/// Top-level error type for docpipe operations.
#[derive(Error, Debug)]
pub enum DocpipeError {
    #[error("session validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("checkpoint invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    /// A step collaborator rejected. The underlying error is carried verbatim
    /// so callers can surface actionable detail; `retryable` is the
    /// collaborator's own classification.
    #[error("step '{step}' failed for session '{session_id}': {source}")]
    Step {
        session_id: String,
        step: StepId,
        retryable: bool,
        #[source]
        source: anyhow::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    #[error("session '{id}' is marked failed and cannot be resumed")]
    SessionNotResumable { id: String },

    #[error("no collaborator registered for step '{step}'")]
    CollaboratorMissing { step: StepId },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocpipeError {
    /// Whether the caller may reasonably retry the operation (i.e. re-invoke
    /// `run` with the same session id without marking the session failed).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Step { retryable: true, .. })
    }
}

/// A persisted session record does not conform to the schema or its
/// invariants. Never silently repaired.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("malformed session record at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("checkpoint for '{step}' recorded at or before '{prev}' (definition order violated)")]
    CheckpointOrder { step: StepId, prev: StepId },

    #[error("{count} checkpoints recorded but only {max} steps are defined")]
    TooManyCheckpoints { count: usize, max: usize },

    #[error("status '{status}' is inconsistent with {count} checkpoints")]
    StatusMismatch { status: String, count: usize },
}

/// A checkpoint append was rejected. Indicates a programming error or a
/// hand-corrupted session file; non-retryable.
#[derive(Error, Debug)]
pub enum InvariantViolation {
    #[error("checkpoint for step '{step}' already exists")]
    DuplicateCheckpoint { step: StepId },

    #[error("cannot append checkpoint for '{step}' after '{last}'")]
    OutOfOrder { step: StepId, last: StepId },

    #[error("checkpoint ledger already holds {len} entries (capacity {max})")]
    LedgerFull { len: usize, max: usize },
}

/// The atomic store could not complete a write. The previous durable record
/// at the target path is intact.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },
}
