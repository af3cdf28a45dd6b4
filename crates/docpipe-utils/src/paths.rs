//! On-disk layout for session storage.
//!
//! A session root holds one directory per session:
//!
//! ```text
//! <root>/
//!   sweep-stamp.json              # retention sweeper's last-run stamp
//!   <session-id>/
//!     session.json                # the durable session record
//!     active.json                 # active-session marker (while protected)
//!     steps/<step-name>/          # per-step output subdirectory
//! ```
//!
//! The orchestrator never interprets step subdirectory contents; only the
//! output-ref strings recorded in checkpoints.

use crate::types::StepId;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the durable session record inside a session directory.
pub const SESSION_FILE_NAME: &str = "session.json";

/// File name of the active-session marker inside a session directory.
pub const ACTIVE_MARKER_NAME: &str = "active.json";

/// File name of the retention sweeper's last-run stamp, at the session root.
pub const SWEEP_STAMP_NAME: &str = "sweep-stamp.json";

/// Directory for a single session under the session-storage root.
#[must_use]
pub fn session_dir(root: &Utf8Path, session_id: &str) -> Utf8PathBuf {
    root.join(session_id)
}

/// Path of the durable session record.
#[must_use]
pub fn session_file(root: &Utf8Path, session_id: &str) -> Utf8PathBuf {
    session_dir(root, session_id).join(SESSION_FILE_NAME)
}

/// Path of the active-session marker for a session directory.
#[must_use]
pub fn marker_file(session_dir: &Utf8Path) -> Utf8PathBuf {
    session_dir.join(ACTIVE_MARKER_NAME)
}

/// Output subdirectory a step collaborator writes its artifacts into.
#[must_use]
pub fn step_output_dir(root: &Utf8Path, session_id: &str, step: StepId) -> Utf8PathBuf {
    session_dir(root, session_id).join("steps").join(step.as_str())
}

/// Path of the sweeper's last-run stamp.
#[must_use]
pub fn sweep_stamp_file(root: &Utf8Path) -> Utf8PathBuf {
    root.join(SWEEP_STAMP_NAME)
}

/// Create a directory and all of its parents, ignoring benign races.
pub fn ensure_dir_all(path: &Utf8Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("failed to create directory: {path}"))
}
