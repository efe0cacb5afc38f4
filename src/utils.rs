//! Utility functions for snapchain
//!
//! Path mapping between source paths and archive members, timestamp
//! extraction, atomic artifact writes and byte formatting.

use crate::error::{Result, SnapchainError};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::trace;

/// Map a full source path to its name inside an archive
///
/// Tar members cannot be absolute, so root and prefix components are dropped
/// (`/data/a.txt` becomes `data/a.txt`). Scanned paths are canonical, so only
/// normal components remain. The same mapping locates a deleted file inside a
/// restore target.
///
/// # Example
///
/// ```rust,ignore
/// use crate::utils::archive_member_name;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(archive_member_name(Path::new("/data/a.txt")), PathBuf::from("data/a.txt"));
/// ```
pub fn archive_member_name(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Convert a file system timestamp to nanoseconds since the Unix epoch
pub fn system_time_to_ns(time: SystemTime) -> Option<i64> {
    let dt: DateTime<Utc> = time.into();
    dt.timestamp_nanos_opt()
}

/// Modification time of a path in nanoseconds, following symlinks
pub fn modified_ns(path: &Path) -> std::io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    system_time_to_ns(modified).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "modification time out of range",
        )
    })
}

/// Write a file atomically
///
/// The content is produced into a temporary file in the destination's
/// directory and renamed to `dest` only when `write` succeeds. On error
/// the temporary file is removed and `dest` is left untouched. Without
/// `overwrite`, an existing `dest` fails the rename with
/// [`std::io::ErrorKind::AlreadyExists`].
pub fn write_atomic<F>(dest: &Path, overwrite: bool, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(dir)?;

    let mut writer = BufWriter::new(temp.reopen()?);
    write(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    if overwrite {
        temp.persist(dest).map_err(|e| SnapchainError::Io(e.error))?;
    } else {
        temp.persist_noclobber(dest).map_err(|e| SnapchainError::Io(e.error))?;
    }
    trace!("Persisted {:?}", dest);
    Ok(())
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
