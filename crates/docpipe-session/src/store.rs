//! Crash-safe persistence of session records.
//!
//! Every mutation goes through [`SessionStore::write_session`]: serialize,
//! re-parse the serialized bytes, re-validate, then atomically rename onto
//! the durable path. A process kill at any point leaves either the previous
//! record or the new record on disk, never a mix.

use crate::model::Session;
use camino::{Utf8Path, Utf8PathBuf};
use docpipe_utils::atomic_write::{clean_stale_temps, write_file_atomic};
use docpipe_utils::error::{DocpipeError, StorageError, ValidationError};
use docpipe_utils::paths;
use docpipe_utils::types::StepId;

/// Handle on a session-storage root directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: Utf8PathBuf,
}

impl SessionStore {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The session-storage root this store operates under.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory holding a session's record, marker, and step outputs.
    #[must_use]
    pub fn session_dir(&self, session_id: &str) -> Utf8PathBuf {
        paths::session_dir(&self.root, session_id)
    }

    /// Path of a session's durable record.
    #[must_use]
    pub fn session_file(&self, session_id: &str) -> Utf8PathBuf {
        paths::session_file(&self.root, session_id)
    }

    /// Create the session directory and one output subdirectory per defined
    /// step. Collaborators write their artifacts there; the orchestrator
    /// never interprets the contents.
    pub fn create_layout(&self, session: &Session) -> Result<(), DocpipeError> {
        for step in StepId::ALL {
            let dir = paths::step_output_dir(&self.root, &session.id, step);
            paths::ensure_dir_all(&dir).map_err(|e| StorageError::WriteFailed {
                path: dir.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Whether a record exists for `session_id`.
    #[must_use]
    pub fn exists(&self, session_id: &str) -> bool {
        self.session_file(session_id).is_file()
    }

    /// Persist a session record atomically.
    ///
    /// The serialized bytes are parsed back and re-validated before the
    /// rename, so a record that would fail a later read is never committed.
    /// Leftover temp files from a previous crash are cleaned up first.
    ///
    /// # Errors
    /// `Validation` if the record (or its serialized form) violates an
    /// invariant; `Storage` if the write or rename fails — in which case the
    /// previous durable record is intact.
    pub fn write_session(&self, session: &Session) -> Result<Utf8PathBuf, DocpipeError> {
        session.validate()?;

        let path = self.session_file(&session.id);
        let bytes = serde_json::to_vec_pretty(session).map_err(|e| StorageError::WriteFailed {
            path: path.to_string(),
            reason: format!("serialization failed: {e}"),
        })?;

        // Validate the bytes that will actually land on disk.
        let reread: Session =
            serde_json::from_slice(&bytes).map_err(|e| ValidationError::Malformed {
                path: path.to_string(),
                reason: format!("serialized record does not parse: {e}"),
            })?;
        reread.validate()?;

        if let Some(dir) = path.parent() {
            let _ = clean_stale_temps(dir);
        }

        write_file_atomic(&path, &bytes).map_err(|e| StorageError::WriteFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        Ok(path)
    }

    /// Read and validate a session record.
    ///
    /// # Errors
    /// `SessionNotFound` if no record exists for `session_id`; `Validation`
    /// if the stored bytes do not conform (hand-edited or corrupted file) —
    /// never silently repaired; `Storage` if the file cannot be read.
    pub fn read_session(&self, session_id: &str) -> Result<Session, DocpipeError> {
        let path = self.session_file(session_id);
        if !path.is_file() {
            return Err(DocpipeError::SessionNotFound {
                id: session_id.to_string(),
            });
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| StorageError::ReadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let session: Session =
            serde_json::from_str(&content).map_err(|e| ValidationError::Malformed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        session.validate()?;

        Ok(session)
    }
}
