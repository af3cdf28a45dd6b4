//! Execution engine for docpipe.
//!
//! Wires the session store, the checkpoint ledger, and the deadline
//! controller into a fixed-order, resumable workflow run. Step collaborators
//! are opaque async operations supplied by the caller; the engine only
//! decides skip-or-run, times them, checkpoints their successes, and stops
//! advancing when the soft deadline expires.

mod deadline;
mod orchestrator;
mod step;

pub use deadline::DeadlineController;
pub use orchestrator::{RunOptions, RunSummary, StepSet, WorkflowOrchestrator};
pub use step::{StepCollaborator, StepFailure, StepOutcome, StepOutput, execute_step};
