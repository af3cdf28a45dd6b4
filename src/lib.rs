//! docpipe - resumable, checkpointed pipeline orchestrator.
//!
//! docpipe drives a fixed five-step document-transformation workflow
//! against a durable session record on local disk. A run may be interrupted
//! by a soft deadline, a process restart, or a step failure, and resumes
//! from the last completed step without redoing finished work or corrupting
//! state.
//!
//! The step collaborators themselves (document extraction, design
//! extraction, cross-validation, question generation, document generation)
//! are opaque async operations supplied by the embedding application via
//! [`StepCollaborator`]; docpipe owns everything with invariants to
//! protect: step ordering, at-most-once execution per step per session,
//! crash-safe persistence, and cooperative cancellation on deadline.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use docpipe::{
//!     RunOptions, Session, SessionStore, SourceRefs, StepCollaborator,
//!     StepFailure, StepOutput, StepSet, WorkflowOrchestrator,
//! };
//!
//! struct MyStep;
//!
//! #[async_trait::async_trait]
//! impl StepCollaborator for MyStep {
//!     async fn execute(&self, session: &Session) -> Result<StepOutput, StepFailure> {
//!         // ... real work keyed off session.source_refs ...
//!         Ok(StepOutput::with_refs(vec!["out.json".to_string()]))
//!     }
//! }
//!
//! # async fn demo() -> Result<(), docpipe::DocpipeError> {
//! let store = SessionStore::new("/var/lib/docpipe/sessions");
//! let steps = StepSet::uniform(Arc::new(MyStep));
//! let orchestrator = WorkflowOrchestrator::new(store, steps);
//!
//! let summary = orchestrator
//!     .run(RunOptions::new(SourceRefs {
//!         document: "report.pdf".to_string(),
//!         design: None,
//!     })
//!     .with_deadline_minutes(30))
//!     .await?;
//!
//! println!("{}: {}", summary.session_id, summary.status);
//! # Ok(())
//! # }
//! ```
//!
//! A paused run (deadline expiry) is a normal outcome: re-invoke `run` with
//! [`RunOptions::resume`] and the same session id to continue. Old session
//! directories are reclaimed by the independent [`RetentionSweeper`], which
//! never touches a directory carrying an active-session marker.

pub use docpipe_engine::{
    DeadlineController, RunOptions, RunSummary, StepCollaborator, StepFailure, StepOutcome,
    StepOutput, StepSet, WorkflowOrchestrator, execute_step,
};
pub use docpipe_session::{Checkpoint, Session, SessionConfig, SessionStore, SourceRefs};
pub use docpipe_sweeper::{RetentionSweeper, SweepError, SweepReport};
pub use docpipe_utils::error::{DocpipeError, InvariantViolation, StorageError, ValidationError};
pub use docpipe_utils::logging::init_tracing;
pub use docpipe_utils::types::{SessionStatus, StepId};

/// Active-session marker operations, re-exported for embedders that manage
/// markers outside a run (e.g. operational tooling).
pub mod marker {
    pub use docpipe_marker::{MarkerInfo, create, exists, read, remove};
}
