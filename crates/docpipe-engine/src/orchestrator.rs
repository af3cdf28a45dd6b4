//! Workflow orchestrator: the top-level driver for a pipeline run.
//!
//! `run` resolves or creates the session record, arms the deadline
//! controller, executes the five steps in fixed order with skip-if-done
//! semantics, and finalizes the session status. Deadline expiry is a
//! normal outcome (a paused summary), not an error. A step failure stops
//! the run and surfaces the collaborator's error together with the session
//! id; whether that marks the session failed is the caller's decision, so
//! transient errors never permanently fail a session.

use crate::deadline::DeadlineController;
use crate::step::{StepCollaborator, execute_step};
use docpipe_session::{Session, SessionConfig, SessionStore, SourceRefs};
use docpipe_utils::error::{DocpipeError, StorageError};
use docpipe_utils::types::{SessionStatus, StepId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Collaborators registered per step.
#[derive(Default, Clone)]
pub struct StepSet {
    steps: HashMap<StepId, Arc<dyn StepCollaborator>>,
}

impl StepSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the collaborator for one step, replacing any previous one.
    pub fn insert(&mut self, step: StepId, collaborator: Arc<dyn StepCollaborator>) -> &mut Self {
        self.steps.insert(step, collaborator);
        self
    }

    /// Register one collaborator for every step. Convenience for callers
    /// whose collaborator dispatches on the session itself, and for tests.
    #[must_use]
    pub fn uniform(collaborator: Arc<dyn StepCollaborator>) -> Self {
        let mut set = Self::new();
        for step in StepId::ALL {
            set.insert(step, Arc::clone(&collaborator));
        }
        set
    }

    fn get(&self, step: StepId) -> Option<&Arc<dyn StepCollaborator>> {
        self.steps.get(&step)
    }
}

/// Options for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// External inputs, captured into the session at creation. Ignored on
    /// resume — the session's own refs win.
    pub source_refs: SourceRefs,
    /// Resume an existing session instead of creating a new one.
    pub resume_id: Option<String>,
    /// Soft deadline for this run; only consulted at creation (the session
    /// config is captured once and never mutated).
    pub deadline: Option<Duration>,
    /// Iteration cap handed to collaborators; only consulted at creation.
    pub max_iterations: Option<u32>,
}

impl RunOptions {
    #[must_use]
    pub fn new(source_refs: SourceRefs) -> Self {
        Self {
            source_refs,
            resume_id: None,
            deadline: None,
            max_iterations: None,
        }
    }

    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Minute-granular deadline, the unit the outer surface speaks.
    #[must_use]
    pub fn with_deadline_minutes(self, minutes: u64) -> Self {
        self.with_deadline(Duration::from_secs(minutes * 60))
    }
}

/// What a `run` invocation accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub session_id: String,
    pub status: SessionStatus,
    /// Steps holding a checkpoint, in completion order.
    pub completed_steps: Vec<StepId>,
    /// Wall-clock time of this invocation (not the session's lifetime).
    pub elapsed_ms: u64,
}

/// Top-level driver executing the five steps in fixed order against a
/// durable session record.
pub struct WorkflowOrchestrator {
    store: SessionStore,
    steps: StepSet,
}

impl WorkflowOrchestrator {
    #[must_use]
    pub fn new(store: SessionStore, steps: StepSet) -> Self {
        Self { store, steps }
    }

    /// The session store this orchestrator persists through.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Execute (or resume) a workflow run.
    ///
    /// The deadline is checked **before** each step, never during one:
    /// cancellation is cooperative, so a step already in flight finishes
    /// before expiry is observed. Expiry between steps persists a paused
    /// record and returns a paused summary — a normal terminal outcome of
    /// the call, not an error.
    ///
    /// # Errors
    /// A collaborator failure is propagated with the session id and failing
    /// step; nothing beyond the already-persisted checkpoints is written, so
    /// the session stays resumable at the failed step. Storage and
    /// validation failures propagate as-is.
    pub async fn run(&self, options: RunOptions) -> Result<RunSummary, DocpipeError> {
        let run_started = Instant::now();
        let mut session = self.resolve_session(&options)?;

        if session.status == SessionStatus::Completed {
            // Nothing left to do; don't re-arm timers or markers.
            return Ok(summary(&session, run_started));
        }

        let session_dir = self.store.session_dir(&session.id);
        docpipe_marker::create(&session_dir, &session.id)
            .map_err(|e| storage_failure(&session_dir, &e))?;

        let deadline = Duration::from_millis(session.config.deadline_ms);
        let controller = DeadlineController::start(deadline, {
            let store = self.store.clone();
            let session_id = session.id.clone();
            move || async move {
                persist_paused_snapshot(&store, &session_id);
            }
        });

        for step in StepId::ALL {
            if controller.is_expired() {
                controller.cancel();
                session.status = SessionStatus::Paused;
                session.touch();
                self.store.write_session(&session)?;
                info!(
                    session_id = %session.id,
                    next_step = %step,
                    "deadline expired, pausing before next step"
                );
                return Ok(summary(&session, run_started));
            }

            let collaborator = self
                .steps
                .get(step)
                .ok_or(DocpipeError::CollaboratorMissing { step })?;

            if let Err(e) = execute_step(&self.store, &mut session, step, collaborator.as_ref()).await
            {
                controller.cancel();
                return Err(e);
            }
        }

        controller.cancel();
        session.status = SessionStatus::Completed;
        session.touch();
        self.store.write_session(&session)?;
        docpipe_marker::remove(&session_dir).map_err(|e| storage_failure(&session_dir, &e))?;
        info!(session_id = %session.id, "workflow completed");

        Ok(summary(&session, run_started))
    }

    /// Mark a session failed. This is the caller-driven terminal transition
    /// after an unrecoverable step failure; the orchestrator itself never
    /// sets `failed`. Removes the active-session marker, releasing the
    /// directory to the retention sweeper.
    ///
    /// # Errors
    /// `SessionNotFound` if the id does not resolve; storage and validation
    /// failures propagate.
    pub fn mark_failed(&self, session_id: &str) -> Result<Session, DocpipeError> {
        let mut session = self.store.read_session(session_id)?;
        session.status = SessionStatus::Failed;
        session.touch();
        self.store.write_session(&session)?;

        let session_dir = self.store.session_dir(session_id);
        docpipe_marker::remove(&session_dir).map_err(|e| storage_failure(&session_dir, &e))?;

        info!(session_id = %session.id, "session marked failed");
        Ok(session)
    }

    fn resolve_session(&self, options: &RunOptions) -> Result<Session, DocpipeError> {
        if let Some(id) = &options.resume_id {
            let mut session = self.store.read_session(id)?;
            match session.status {
                SessionStatus::Failed => {
                    return Err(DocpipeError::SessionNotResumable { id: id.clone() });
                }
                SessionStatus::Completed => return Ok(session),
                SessionStatus::InProgress | SessionStatus::Paused => {
                    session.status = SessionStatus::InProgress;
                    session.touch();
                    self.store.write_session(&session)?;
                    info!(
                        session_id = %session.id,
                        current_step = %session.current_step,
                        checkpoints = session.checkpoints.len(),
                        "session resumed"
                    );
                    Ok(session)
                }
            }
        } else {
            let config = SessionConfig {
                deadline_ms: options
                    .deadline
                    .map_or(SessionConfig::DEFAULT_DEADLINE_MS, |d| {
                        u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
                    }),
                max_iterations: options
                    .max_iterations
                    .unwrap_or(SessionConfig::DEFAULT_MAX_ITERATIONS),
            };
            let session = Session::new(options.source_refs.clone(), config);
            self.store.create_layout(&session)?;
            self.store.write_session(&session)?;
            info!(session_id = %session.id, "session created");
            Ok(session)
        }
    }
}

fn summary(session: &Session, started: Instant) -> RunSummary {
    RunSummary {
        session_id: session.id.clone(),
        status: session.status,
        completed_steps: session.completed_steps(),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

fn storage_failure(path: &camino::Utf8Path, e: &anyhow::Error) -> DocpipeError {
    DocpipeError::Storage(StorageError::WriteFailed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Expiry callback: read the latest durable record and persist it paused.
///
/// Works from disk rather than the in-memory session so it never races the
/// orchestrator's ownership of the record; the atomic store makes the
/// concurrent write safe either way. Has no error channel, so failures are
/// logged and dropped.
fn persist_paused_snapshot(store: &SessionStore, session_id: &str) {
    match store.read_session(session_id) {
        Ok(mut session) if session.status == SessionStatus::InProgress => {
            session.status = SessionStatus::Paused;
            session.touch();
            match store.write_session(&session) {
                Ok(_) => {
                    info!(session_id, "deadline expired, paused record persisted");
                }
                Err(e) => {
                    warn!(session_id, error = %e, "failed to persist paused record on expiry");
                }
            }
        }
        Ok(_) => {} // already terminal or paused, nothing to save
        Err(e) => {
            warn!(session_id, error = %e, "failed to load session on expiry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepFailure, StepOutput};
    use async_trait::async_trait;
    use camino::Utf8PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct RecordingStep {
        calls: Mutex<Vec<StepId>>,
        delay: Duration,
        fail_on: Option<(StepId, bool)>,
    }

    impl RecordingStep {
        fn instant() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                fail_on: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::instant()
            }
        }

        fn failing_at(step: StepId, retryable: bool) -> Self {
            Self {
                fail_on: Some((step, retryable)),
                ..Self::instant()
            }
        }

        fn calls(&self) -> Vec<StepId> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepCollaborator for RecordingStep {
        async fn execute(&self, session: &Session) -> Result<StepOutput, StepFailure> {
            let step = next_pending(session);
            self.calls.lock().unwrap().push(step);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some((failing, retryable)) = self.fail_on {
                if failing == step {
                    return Err(StepFailure {
                        message: format!("{step} blew up"),
                        retryable,
                    });
                }
            }
            Ok(StepOutput::with_refs(vec![format!("steps/{step}/out.json")]))
        }
    }

    // The step the engine is about to checkpoint: first one without a
    // checkpoint. Lets a uniform collaborator know what it was called as.
    fn next_pending(session: &Session) -> StepId {
        StepId::ALL
            .into_iter()
            .find(|s| !session.has_checkpoint(*s))
            .unwrap()
    }

    fn orchestrator(collaborator: Arc<dyn StepCollaborator>) -> (WorkflowOrchestrator, TempDir) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = SessionStore::new(root);
        (
            WorkflowOrchestrator::new(store, StepSet::uniform(collaborator)),
            dir,
        )
    }

    fn source_refs() -> SourceRefs {
        SourceRefs {
            document: "doc.pdf".to_string(),
            design: Some("design.fig".to_string()),
        }
    }

    #[tokio::test]
    async fn fresh_run_completes_all_five_steps() {
        let steps = Arc::new(RecordingStep::instant());
        let (orch, _dir) = orchestrator(Arc::clone(&steps) as Arc<dyn StepCollaborator>);

        let summary = orch
            .run(RunOptions::new(source_refs()).with_deadline_minutes(1000))
            .await
            .unwrap();

        assert_eq!(summary.status, SessionStatus::Completed);
        assert_eq!(summary.completed_steps, StepId::ALL.to_vec());
        assert_eq!(steps.calls(), StepId::ALL.to_vec());

        let session = orch.store().read_session(&summary.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.checkpoints.len(), StepId::COUNT);
        // Marker released for the retention sweeper.
        assert!(!docpipe_marker::exists(
            &orch.store().session_dir(&summary.session_id)
        ));
    }

    #[tokio::test]
    async fn zero_deadline_pauses_before_any_step() {
        let steps = Arc::new(RecordingStep::instant());
        let (orch, _dir) = orchestrator(Arc::clone(&steps) as Arc<dyn StepCollaborator>);

        let summary = orch
            .run(RunOptions::new(source_refs()).with_deadline(Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(summary.status, SessionStatus::Paused);
        assert!(summary.completed_steps.is_empty());
        assert!(steps.calls().is_empty());

        let session = orch.store().read_session(&summary.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
        assert!(session.checkpoints.is_empty());
        // A paused session keeps its marker: the pending resume is live work.
        assert!(docpipe_marker::exists(
            &orch.store().session_dir(&summary.session_id)
        ));
    }

    #[tokio::test]
    async fn expiry_mid_run_pauses_at_next_inter_step_check() {
        // Each step overshoots the whole budget, so the second inter-step
        // check observes expiry: exactly one checkpoint lands.
        let steps = Arc::new(RecordingStep::slow(Duration::from_millis(80)));
        let (orch, _dir) = orchestrator(Arc::clone(&steps) as Arc<dyn StepCollaborator>);

        let summary = orch
            .run(RunOptions::new(source_refs()).with_deadline(Duration::from_millis(40)))
            .await
            .unwrap();

        assert_eq!(summary.status, SessionStatus::Paused);
        assert_eq!(summary.completed_steps, vec![StepId::DocExtraction]);
        assert_eq!(steps.calls(), vec![StepId::DocExtraction]);

        let session = orch.store().read_session(&summary.session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Paused);
        assert_eq!(session.checkpoints.len(), 1);
    }

    #[tokio::test]
    async fn resume_skips_checkpointed_steps() {
        let steps = Arc::new(RecordingStep::slow(Duration::from_millis(80)));
        let (orch, dir) = orchestrator(Arc::clone(&steps) as Arc<dyn StepCollaborator>);

        let paused = orch
            .run(RunOptions::new(source_refs()).with_deadline(Duration::from_millis(40)))
            .await
            .unwrap();
        assert_eq!(paused.status, SessionStatus::Paused);
        let done_before = paused.completed_steps.len();
        assert!(done_before < StepId::COUNT);

        // Fresh orchestrator over the same root, as a new process would be.
        let resumed_steps = Arc::new(RecordingStep::instant());
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let orch2 = WorkflowOrchestrator::new(
            SessionStore::new(root),
            StepSet::uniform(Arc::clone(&resumed_steps) as Arc<dyn StepCollaborator>),
        );

        // The captured config's 40ms budget applies again, but the remaining
        // steps are instant, so the run finishes inside it.
        let summary = orch2
            .run(RunOptions::new(source_refs()).resume(&paused.session_id))
            .await
            .unwrap();

        assert_eq!(summary.status, SessionStatus::Completed);
        assert_eq!(summary.session_id, paused.session_id);
        assert_eq!(summary.completed_steps, StepId::ALL.to_vec());
        // Only the steps that lacked checkpoints ran.
        assert_eq!(resumed_steps.calls(), StepId::ALL[done_before..].to_vec());
    }

    #[tokio::test]
    async fn resuming_a_completed_session_runs_nothing() {
        let steps = Arc::new(RecordingStep::instant());
        let (orch, _dir) = orchestrator(Arc::clone(&steps) as Arc<dyn StepCollaborator>);

        let done = orch.run(RunOptions::new(source_refs())).await.unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        let calls_before = steps.calls().len();

        let again = orch
            .run(RunOptions::new(source_refs()).resume(&done.session_id))
            .await
            .unwrap();
        assert_eq!(again.status, SessionStatus::Completed);
        assert_eq!(steps.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn step_failure_propagates_and_leaves_session_resumable() {
        let steps = Arc::new(RecordingStep::failing_at(StepId::CrossValidation, false));
        let (orch, _dir) = orchestrator(Arc::clone(&steps) as Arc<dyn StepCollaborator>);

        let err = orch.run(RunOptions::new(source_refs())).await.unwrap_err();
        let session_id = match &err {
            DocpipeError::Step {
                session_id,
                step,
                retryable,
                ..
            } => {
                assert_eq!(*step, StepId::CrossValidation);
                assert!(!retryable);
                session_id.clone()
            }
            other => panic!("expected Step error, got {other}"),
        };

        // Exactly the two checkpoints before the failure; current_step
        // untouched by the failed attempt; still in-progress on disk.
        let session = orch.store().read_session(&session_id).unwrap();
        assert_eq!(session.checkpoints.len(), 2);
        assert_eq!(session.current_step, StepId::DesignExtraction);
        assert_eq!(session.status, SessionStatus::InProgress);

        // Caller decides: mark it failed.
        let failed = orch.mark_failed(&session_id).unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert!(!docpipe_marker::exists(&orch.store().session_dir(&session_id)));

        // Failed is terminal for the normal resume path.
        let err = orch
            .run(RunOptions::new(source_refs()).resume(&session_id))
            .await
            .unwrap_err();
        assert!(matches!(err, DocpipeError::SessionNotResumable { .. }));
    }

    #[tokio::test]
    async fn retryable_failure_can_be_resumed_at_the_same_step() {
        let steps = Arc::new(RecordingStep::failing_at(StepId::DesignExtraction, true));
        let (orch, dir) = orchestrator(Arc::clone(&steps) as Arc<dyn StepCollaborator>);

        let err = orch.run(RunOptions::new(source_refs())).await.unwrap_err();
        assert!(err.is_retryable());
        let session_id = match err {
            DocpipeError::Step { session_id, .. } => session_id,
            other => panic!("expected Step error, got {other}"),
        };

        let retry_steps = Arc::new(RecordingStep::instant());
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let orch2 = WorkflowOrchestrator::new(
            SessionStore::new(root),
            StepSet::uniform(Arc::clone(&retry_steps) as Arc<dyn StepCollaborator>),
        );
        let summary = orch2
            .run(RunOptions::new(source_refs()).resume(&session_id))
            .await
            .unwrap();

        assert_eq!(summary.status, SessionStatus::Completed);
        // Retry re-entered at the failed step, not from the beginning.
        assert_eq!(retry_steps.calls()[0], StepId::DesignExtraction);
    }

    #[tokio::test]
    async fn missing_collaborator_is_an_error() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let orch = WorkflowOrchestrator::new(SessionStore::new(root), StepSet::new());

        let err = orch.run(RunOptions::new(source_refs())).await.unwrap_err();
        assert!(matches!(
            err,
            DocpipeError::CollaboratorMissing {
                step: StepId::DocExtraction
            }
        ));
    }

    #[tokio::test]
    async fn expiry_callback_persists_a_paused_record_mid_step() {
        // Deadline fires while a slow step is in flight; the one-shot
        // callback must save a paused snapshot before the step ends.
        struct BlockedStep;

        #[async_trait]
        impl StepCollaborator for BlockedStep {
            async fn execute(&self, _session: &Session) -> Result<StepOutput, StepFailure> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(StepOutput::empty())
            }
        }

        let (orch, _dir) = orchestrator(Arc::new(BlockedStep));
        let store = orch.store().clone();

        let handle = tokio::spawn(async move {
            orch.run(RunOptions::new(source_refs()).with_deadline(Duration::from_millis(40)))
                .await
        });

        // Past the 40ms deadline, before the 200ms step finishes: the
        // callback has had its window.
        tokio::time::sleep(Duration::from_millis(120)).await;
        let session_id = only_session_id(store.root());
        let mid_flight = store.read_session(&session_id).unwrap();
        assert_eq!(mid_flight.status, SessionStatus::Paused);
        assert!(mid_flight.checkpoints.is_empty());

        // The in-flight step still finishes (cooperative cancellation) and
        // earns its checkpoint; the inter-step check then observes expiry.
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.status, SessionStatus::Paused);
        assert_eq!(summary.completed_steps.len(), 1);

        let settled = store.read_session(&summary.session_id).unwrap();
        assert_eq!(settled.status, SessionStatus::Paused);
        assert_eq!(settled.checkpoints.len(), 1);
    }

    // The single session directory under a test root.
    fn only_session_id(root: &camino::Utf8Path) -> String {
        let mut ids: Vec<String> = root
            .read_dir_utf8()
            .unwrap()
            .filter_map(|e| {
                let e = e.unwrap();
                e.file_type().unwrap().is_dir().then(|| e.file_name().to_string())
            })
            .collect();
        assert_eq!(ids.len(), 1);
        ids.pop().unwrap()
    }
}
