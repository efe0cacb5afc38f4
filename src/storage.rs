//! On-disk backup store
//!
//! The store owns every durable entity: dated snapshots, archives and
//! deletion records. Nothing in it is ever rewritten once a snapshot for its
//! date exists.
//!
//! ## Layout
//!
//! ```text
//! store_root/
//! ├── 2024-03-01.base.tar.lz4      # full archive, first run only
//! ├── 2024-03-02.added.tar.lz4     # files added since the previous snapshot
//! ├── 2024-03-02.modified.tar.lz4  # files whose mtime changed
//! ├── 2024-03-02.deleted.csv       # paths removed since the previous snapshot
//! └── snapshots/
//!     ├── 2024-03-01.snapshot.csv
//!     └── 2024-03-02.snapshot.csv
//! ```
//!
//! ## Snapshot format
//!
//! Snapshots are headerless CSV with non-numeric fields quoted, one
//! `"path",modified_ns` row per file. The timestamp is an integer number of
//! nanoseconds, so it round-trips exactly.
//!
//! ## Ordering
//!
//! Dates are compared as [`NaiveDate`] values, never as file name strings.

use crate::compression::ArchiveCompression;
use crate::error::{Result, SnapchainError};
use crate::types::{format_date, parse_date, Artifact, ArtifactKind, FileRecord, Inventory};
use crate::utils;
use chrono::NaiveDate;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Name of the directory holding snapshots
pub const SNAPSHOTS_DIR: &str = "snapshots";
/// Suffix of snapshot files
pub const SNAPSHOT_SUFFIX: &str = ".snapshot.csv";
/// Extension of deletion records
pub const RECORD_EXTENSION: &str = "csv";

/// Backup store rooted at a directory
#[derive(Debug, Clone)]
pub struct Store {
    /// Root directory holding artifacts
    root: PathBuf,
}

impl Store {
    /// Open a store at `root` without touching the file system
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the store directories if needed
    pub fn init(root: PathBuf) -> Result<Self> {
        let store = Self::new(root);
        fs::create_dir_all(store.snapshots_dir())?;
        debug!("Initialized store at {:?}", store.root);
        Ok(store)
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding snapshot files
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join(SNAPSHOTS_DIR)
    }

    /// Location of the snapshot for `date`
    pub fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.snapshots_dir()
            .join(format!("{}{}", format_date(date), SNAPSHOT_SUFFIX))
    }

    /// Whether a snapshot exists for `date`
    pub fn snapshot_exists(&self, date: NaiveDate) -> bool {
        self.snapshot_path(date).exists()
    }

    /// Location of an artifact of `kind` for `date`
    ///
    /// Deletion records ignore `compression`.
    pub fn artifact_path(
        &self,
        date: NaiveDate,
        kind: ArtifactKind,
        compression: ArchiveCompression,
    ) -> PathBuf {
        let ext = if kind.is_archive() {
            compression.extension()
        } else {
            RECORD_EXTENSION
        };
        self.root
            .join(format!("{}.{}.{}", format_date(date), kind.as_str(), ext))
    }

    /// Sorted dates for which a snapshot exists
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::StoreCorruption`] if a snapshot file name carries an
    ///   invalid date
    pub fn list_dates(&self) -> Result<Vec<NaiveDate>> {
        let dir = self.snapshots_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut dates = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                trace!("Ignoring non UTF-8 entry {:?}", entry.path());
                continue;
            };
            let Some(stem) = name.strip_suffix(SNAPSHOT_SUFFIX) else {
                trace!("Ignoring {:?}", entry.path());
                continue;
            };
            let date = parse_date(stem).ok_or_else(|| {
                SnapchainError::corruption(entry.path(), "snapshot name is not a YYYY-MM-DD date")
            })?;
            dates.push(date);
        }

        dates.sort_unstable();
        Ok(dates)
    }

    /// Latest snapshot, or `None` if no backup has ever run
    pub fn load_latest(&self) -> Result<Option<(NaiveDate, Inventory)>> {
        match self.list_dates()?.last() {
            Some(&date) => {
                let inventory = self.read_snapshot(&self.snapshot_path(date))?;
                Ok(Some((date, inventory)))
            }
            None => Ok(None),
        }
    }

    /// Snapshot for `date`, or `None` if there is none
    pub fn load_by_date(&self, date: NaiveDate) -> Result<Option<Inventory>> {
        let path = self.snapshot_path(date);
        if !path.exists() {
            return Ok(None);
        }
        self.read_snapshot(&path).map(Some)
    }

    /// Persist `inventory` as the snapshot for `date`
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::DuplicateRun`] if a snapshot for `date` exists; the
    ///   existing file is left untouched
    pub fn save(&self, date: NaiveDate, inventory: &Inventory) -> Result<PathBuf> {
        let path = self.snapshot_path(date);
        if path.exists() {
            return Err(SnapchainError::DuplicateRun { date });
        }
        fs::create_dir_all(self.snapshots_dir())?;

        let result = utils::write_atomic(&path, false, |w| {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .quote_style(QuoteStyle::NonNumeric)
                .from_writer(w);
            for (file, modified_ns) in inventory.iter() {
                writer.serialize((path_field(file)?, modified_ns))?;
            }
            writer.flush()?;
            Ok(())
        });

        match result {
            Err(SnapchainError::Io(e)) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(SnapchainError::DuplicateRun { date })
            }
            other => other,
        }?;

        info!("Saved snapshot {:?} ({} files)", path, inventory.len());
        Ok(path)
    }

    /// Every recognised artifact, sorted by date then kind
    pub fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut artifacts = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Some(artifact) = parse_artifact_name(&path)? {
                artifacts.push(artifact);
            }
        }

        artifacts.sort_by(|a, b| (a.date, a.kind, &a.path).cmp(&(b.date, b.kind, &b.path)));
        Ok(artifacts)
    }

    /// Artifacts written on `date`, archives first then the deletion record
    pub fn artifacts_for(&self, date: NaiveDate) -> Result<Vec<Artifact>> {
        Ok(self
            .list_artifacts()?
            .into_iter()
            .filter(|a| a.date == date)
            .collect())
    }

    /// All Base archives in the store (a healthy store has at most one)
    pub fn base_artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(self
            .list_artifacts()?
            .into_iter()
            .filter(|a| a.kind == ArtifactKind::Base)
            .collect())
    }

    fn read_snapshot(&self, path: &Path) -> Result<Inventory> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .from_reader(BufReader::new(file));

        let mut inventory = Inventory::new();
        for row in reader.deserialize::<(String, i64)>() {
            let (file, modified_ns) = row.map_err(|e| SnapchainError::corruption(path, e.to_string()))?;
            if inventory
                .insert(FileRecord::new(PathBuf::from(&file), modified_ns))
                .is_some()
            {
                return Err(SnapchainError::corruption(
                    path,
                    format!("duplicate entry for {}", file),
                ));
            }
        }

        debug!("Loaded snapshot {:?} ({} files)", path, inventory.len());
        Ok(inventory)
    }
}

/// Render a path as a CSV field
pub(crate) fn path_field(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        SnapchainError::InvalidConfiguration(format!("path {:?} is not valid UTF-8", path))
    })
}

/// Recognise `{date}.{kind}.{ext}` artifact names
///
/// Returns `Ok(None)` for files that are not artifacts (temp files, notes).
/// A name with a known kind and extension but an invalid date is corruption.
fn parse_artifact_name(path: &Path) -> Result<Option<Artifact>> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let Some((date_part, rest)) = name.split_once('.') else {
        return Ok(None);
    };
    let Some((tag, ext)) = rest.split_once('.') else {
        return Ok(None);
    };
    let Some(kind) = ArtifactKind::from_tag(tag) else {
        return Ok(None);
    };

    let compression = if kind.is_archive() {
        match ArchiveCompression::from_extension(ext) {
            Some(c) => Some(c),
            None => return Ok(None),
        }
    } else if ext == RECORD_EXTENSION {
        None
    } else {
        return Ok(None);
    };

    let date = parse_date(date_part)
        .ok_or_else(|| SnapchainError::corruption(path, "artifact name is not dated YYYY-MM-DD"))?;

    Ok(Some(Artifact {
        date,
        kind,
        compression,
        path: path.to_path_buf(),
    }))
}
