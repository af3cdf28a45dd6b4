//! Atomic file writes via temp file + fsync + rename.
//!
//! Writers never leave a partial file observable at the target path: a
//! reader sees either the fully-previous version or the fully-new version.
//! Any failure before the rename removes the temporary file and leaves the
//! target untouched.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Atomically replace the file at `path` with `bytes`.
///
/// The temporary file is created in the target's parent directory so the
/// final rename never crosses a filesystem boundary. Data is fsynced before
/// the rename.
///
/// # Errors
/// Returns an error if the parent directory cannot be created, the temp file
/// cannot be written or synced, or the rename fails. In every failure case
/// the previous content of `path` (if any) is preserved; the temp file is
/// cleaned up on drop.
pub fn write_file_atomic(path: &Utf8Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory: {parent}"))?;
    }

    let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in: {dir}"))?;

    temp.write_all(bytes)
        .context("failed to write to temporary file")?;
    temp.as_file()
        .sync_all()
        .context("failed to fsync temporary file")?;

    temp.persist(path.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| format!("failed to atomically replace: {path}"))?;

    Ok(())
}

/// Remove leftover temporary files in `dir`.
///
/// A process killed between temp-file creation and rename leaves an orphaned
/// `.tmp*` sibling behind. Callers invoke this before their next write so a
/// crash never accumulates garbage next to the durable record.
pub fn clean_stale_temps(dir: &Utf8Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in dir
        .read_dir_utf8()
        .with_context(|| format!("failed to list directory: {dir}"))?
    {
        let entry = entry?;
        if entry.file_name().starts_with(".tmp") && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())
                .with_context(|| format!("failed to remove stale temp file: {}", entry.path()))?;
            removed += 1;
        }
    }
    Ok(removed)
}
