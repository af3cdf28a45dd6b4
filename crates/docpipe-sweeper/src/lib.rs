//! Retention sweep of aged-out session directories.
//!
//! The sweeper runs independently of the orchestrator. Given a
//! session-storage root and a retention window, it deletes session
//! directories whose last-modified time exceeds the window — except
//! directories carrying an active-session marker, which are skipped
//! regardless of age. Per-session problems are logged and collected into
//! the report, never aborting the sweep. The sweeper persists its own
//! last-run stamp so repeated invocations can be throttled.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use docpipe_utils::atomic_write::write_file_atomic;
use docpipe_utils::paths;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Last-run stamp persisted at the session root.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SweepStamp {
    last_run: DateTime<Utc>,
}

/// A per-session problem encountered during a sweep. Logged, collected,
/// never fatal.
#[derive(Debug, Clone)]
pub struct SweepError {
    pub session_id: String,
    pub reason: String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Session directories examined.
    pub scanned: usize,
    /// Session ids whose directories were deleted.
    pub deleted: Vec<String>,
    /// Directories skipped because an active-session marker was present.
    pub skipped_active: usize,
    /// Directories skipped because they are younger than the retention
    /// window.
    pub skipped_recent: usize,
    /// Per-session errors (mtime unreadable, deletion failed).
    pub errors: Vec<SweepError>,
}

/// Deletes session directories older than a retention window.
pub struct RetentionSweeper {
    root: Utf8PathBuf,
    retention: Duration,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>, retention: Duration) -> Self {
        Self {
            root: root.into(),
            retention,
        }
    }

    /// Whether the previous sweep ran within `min_interval`. Callers use
    /// this to skip redundant invocations; a missing or unreadable stamp
    /// counts as not throttled.
    #[must_use]
    pub fn throttled(&self, min_interval: Duration) -> bool {
        let path = paths::sweep_stamp_file(&self.root);
        let Ok(content) = fs::read_to_string(&path) else {
            return false;
        };
        let Ok(stamp) = serde_json::from_str::<SweepStamp>(&content) else {
            return false;
        };
        let elapsed = Utc::now().signed_duration_since(stamp.last_run);
        elapsed
            .to_std()
            .map(|elapsed| elapsed < min_interval)
            .unwrap_or(false)
    }

    /// Sweep the root once and persist the last-run stamp.
    ///
    /// # Errors
    /// Returns an error only if the root cannot be listed or the stamp
    /// cannot be written; everything per-session is reported, not raised.
    pub fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        if self.root.is_dir() {
            for entry in self
                .root
                .read_dir_utf8()
                .with_context(|| format!("failed to list session root: {}", self.root))?
            {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue; // the stamp file and other loose files
                }
                self.sweep_session_dir(entry.path(), &mut report);
            }
        }

        self.write_stamp()?;
        info!(
            scanned = report.scanned,
            deleted = report.deleted.len(),
            skipped_active = report.skipped_active,
            skipped_recent = report.skipped_recent,
            errors = report.errors.len(),
            "retention sweep finished"
        );
        Ok(report)
    }

    fn sweep_session_dir(&self, dir: &Utf8Path, report: &mut SweepReport) {
        let session_id = dir.file_name().unwrap_or_default().to_string();
        report.scanned += 1;

        if docpipe_marker::exists(dir) {
            debug!(session_id, "active marker present, skipping");
            report.skipped_active += 1;
            return;
        }

        let age = match last_modified_age(dir) {
            Ok(age) => age,
            Err(e) => {
                warn!(session_id, error = %e, "could not determine session age");
                report.errors.push(SweepError {
                    session_id,
                    reason: e.to_string(),
                });
                return;
            }
        };

        if age <= self.retention {
            report.skipped_recent += 1;
            return;
        }

        match fs::remove_dir_all(dir) {
            Ok(()) => {
                info!(session_id, age_secs = age.as_secs(), "session directory deleted");
                report.deleted.push(session_id);
            }
            Err(e) => {
                warn!(session_id, error = %e, "failed to delete session directory");
                report.errors.push(SweepError {
                    session_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn write_stamp(&self) -> Result<()> {
        let stamp = SweepStamp {
            last_run: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&stamp).context("failed to serialize sweep stamp")?;
        write_file_atomic(&paths::sweep_stamp_file(&self.root), &bytes)
            .context("failed to persist sweep stamp")
    }
}

/// Age of a session directory: mtime of the session record when present
/// (the record is rewritten on every mutation), else the directory's own.
fn last_modified_age(dir: &Utf8Path) -> Result<Duration> {
    let record = dir.join(paths::SESSION_FILE_NAME);
    let target = if record.is_file() { record } else { dir.to_owned() };
    let modified = fs::metadata(&target)
        .and_then(|m| m.modified())
        .with_context(|| format!("failed to stat: {target}"))?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}
