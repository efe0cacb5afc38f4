//! Core data types used throughout snapchain
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **File System State**: `FileRecord`, `Inventory` - files and their modification times
//! - **Changes**: `ChangeSet` - classification of paths between two inventories
//! - **Store Entities**: `ArtifactKind`, `Artifact` - dated files in the backup store
//! - **Operations**: `BackupReport`, `RestoreReport`, `RestoreOptions`
//!
//! ## Examples
//!
//! ```rust
//! use snapchain::types::{FileRecord, Inventory};
//! use std::path::PathBuf;
//!
//! let mut inventory = Inventory::new();
//! inventory.insert(FileRecord::new(PathBuf::from("/data/a.txt"), 1_700_000_000_000_000_000));
//! assert_eq!(inventory.len(), 1);
//! ```

use crate::compression::ArchiveCompression;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Date format used in snapshot and artifact file names
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` snapshot date
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    // chrono accepts unpadded fields; file names must be zero padded
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

/// Render a snapshot date as `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// A single file observed by a scan
///
/// The modification time is kept as integer nanoseconds since the Unix epoch
/// so it survives persistence without any rounding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    /// Full path of the file under the source root
    pub path: PathBuf,
    /// Last modification time in nanoseconds since the Unix epoch
    pub modified_ns: i64,
}

impl FileRecord {
    /// Create a new record
    pub fn new(path: PathBuf, modified_ns: i64) -> Self {
        Self { path, modified_ns }
    }
}

/// Complete path to modification-time map of a source tree
///
/// Paths are unique; iteration is ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    records: BTreeMap<PathBuf, i64>,
}

impl Inventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the previous modification time for the path
    pub fn insert(&mut self, record: FileRecord) -> Option<i64> {
        self.records.insert(record.path, record.modified_ns)
    }

    /// Modification time recorded for a path
    pub fn get(&self, path: &Path) -> Option<i64> {
        self.records.get(path).copied()
    }

    /// Whether the inventory holds a path
    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the inventory has no files
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over `(path, modified_ns)` in path order
    pub fn iter(&self) -> impl Iterator<Item = (&Path, i64)> {
        self.records.iter().map(|(p, t)| (p.as_path(), *t))
    }

    /// Iterate over paths in order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(PathBuf::as_path)
    }

    /// Set of all paths
    pub fn path_set(&self) -> BTreeSet<PathBuf> {
        self.records.keys().cloned().collect()
    }

    /// Owned records in path order
    pub fn to_records(&self) -> Vec<FileRecord> {
        self.iter()
            .map(|(p, t)| FileRecord::new(p.to_path_buf(), t))
            .collect()
    }
}

impl FromIterator<FileRecord> for Inventory {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        let mut inventory = Inventory::new();
        for record in iter {
            inventory.insert(record);
        }
        inventory
    }
}

/// Classification of paths between a previous and a current inventory
///
/// Only modification times are compared: a content change that keeps the
/// timestamp is not detected.
///
/// # Examples
///
/// ```rust
/// # use snapchain::types::ChangeSet;
/// let changes = ChangeSet::default();
/// assert!(!changes.has_changes());
/// assert_eq!(changes.total_operations(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Paths present now but not before
    pub added: BTreeSet<PathBuf>,
    /// Paths present before but not now
    pub removed: BTreeSet<PathBuf>,
    /// Paths present in both with a different modification time
    pub modified: BTreeSet<PathBuf>,
    /// Number of paths present in both with the same modification time
    pub unchanged: usize,
}

impl ChangeSet {
    /// Check if anything was added, removed or modified
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.modified.is_empty()
    }

    /// Total number of changed paths
    pub fn total_operations(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Kind of a dated artifact in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Full archive written by the first run
    Base,
    /// Archive of files added since the previous snapshot
    Added,
    /// Archive of files modified since the previous snapshot
    Modified,
    /// Record of paths removed since the previous snapshot
    Deleted,
}

impl ArtifactKind {
    /// Archive kinds, in extraction order
    pub const ARCHIVES: [ArtifactKind; 3] =
        [ArtifactKind::Base, ArtifactKind::Added, ArtifactKind::Modified];

    /// Tag used in the artifact file name
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Base => "base",
            ArtifactKind::Added => "added",
            ArtifactKind::Modified => "modified",
            ArtifactKind::Deleted => "deleted",
        }
    }

    /// Parse a file name tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "base" => Some(ArtifactKind::Base),
            "added" => Some(ArtifactKind::Added),
            "modified" => Some(ArtifactKind::Modified),
            "deleted" => Some(ArtifactKind::Deleted),
            _ => None,
        }
    }

    /// Whether artifacts of this kind are archives (as opposed to records)
    pub fn is_archive(&self) -> bool {
        !matches!(self, ArtifactKind::Deleted)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dated artifact file found in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Date of the run that produced it
    pub date: NaiveDate,
    /// What it holds
    pub kind: ArtifactKind,
    /// Stream format for archives; `None` for deletion records
    pub compression: Option<ArchiveCompression>,
    /// Location on disk
    pub path: PathBuf,
}

/// One dated entry of the store's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Snapshot date
    pub date: NaiveDate,
    /// Number of files in the snapshot
    pub file_count: usize,
    /// Artifacts written on that date
    pub artifacts: Vec<Artifact>,
}

/// Outcome of one backup run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupReport {
    /// Date of the run
    pub date: NaiveDate,
    /// Whether this run produced the Base archive
    pub is_base: bool,
    /// Files in the new snapshot
    pub file_count: usize,
    /// Classification against the previous snapshot (everything added for a base run)
    pub changes: ChangeSet,
    /// Artifacts written by this run
    pub artifacts: Vec<Artifact>,
    /// Location of the new snapshot
    pub snapshot_path: PathBuf,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Options controlling a restore
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Restore as of this date; `None` replays every snapshot
    pub target_date: Option<NaiveDate>,
    /// Fail when a deletion record names a file already missing from the target
    pub strict_deletes: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            target_date: None,
            strict_deletes: true,
        }
    }
}

/// Outcome of one restore run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Effective restore date (latest date in the replayed chain)
    pub restored_date: NaiveDate,
    /// Dates replayed, in order
    pub dates_replayed: Vec<NaiveDate>,
    /// Number of archives extracted
    pub archives_extracted: usize,
    /// Number of archive members written to the target
    pub files_extracted: usize,
    /// Number of files removed by deletion records
    pub files_deleted: usize,
    /// Deletions skipped because the file was already absent
    pub missing_deletes: Vec<PathBuf>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}
