//! Active-session marker files.
//!
//! A marker is a small JSON sentinel inside a session directory, created
//! when a run starts and removed when the session reaches `completed` or
//! `failed`. Its presence tells the retention sweeper to leave the session
//! directory alone regardless of age. A paused session keeps its marker:
//! a pending resume is still live work.
//!
//! The marker is advisory. It coordinates the orchestrator and the sweeper
//! but is not a lock and not a security boundary.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use docpipe_utils::atomic_write::write_file_atomic;
use docpipe_utils::paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::process;

/// Contents of an active-session marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerInfo {
    /// Process that created the marker.
    pub pid: u32,
    /// Session the marker protects.
    pub session_id: String,
    /// When the marker was written.
    pub created_at: DateTime<Utc>,
}

/// Write the active-session marker for `session_id` into `session_dir`.
///
/// Overwrites any existing marker (a resumed run refreshes the timestamp).
///
/// # Errors
/// Returns an error if the marker cannot be serialized or written.
pub fn create(session_dir: &Utf8Path, session_id: &str) -> Result<Utf8PathBuf> {
    let info = MarkerInfo {
        pid: process::id(),
        session_id: session_id.to_string(),
        created_at: Utc::now(),
    };
    let path = paths::marker_file(session_dir);
    let bytes = serde_json::to_vec_pretty(&info).context("failed to serialize marker")?;
    write_file_atomic(&path, &bytes)
        .with_context(|| format!("failed to write active-session marker: {path}"))?;
    Ok(path)
}

/// Whether `session_dir` carries an active-session marker.
#[must_use]
pub fn exists(session_dir: &Utf8Path) -> bool {
    paths::marker_file(session_dir).is_file()
}

/// Read the marker in `session_dir`, if any.
///
/// # Errors
/// Returns an error if a marker file exists but cannot be read or parsed.
pub fn read(session_dir: &Utf8Path) -> Result<Option<MarkerInfo>> {
    let path = paths::marker_file(session_dir);
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read active-session marker: {path}"))?;
    let info = serde_json::from_str(&content)
        .with_context(|| format!("malformed active-session marker: {path}"))?;
    Ok(Some(info))
}

/// Remove the marker from `session_dir`. Idempotent: a missing marker is
/// not an error.
pub fn remove(session_dir: &Utf8Path) -> Result<()> {
    let path = paths::marker_file(session_dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("failed to remove active-session marker: {path}"))
        }
    }
}
