//! Backup and restore orchestration
//!
//! [`Snapchain`] ties the scanner, the store and the archive I/O together
//! into the two runs of the system:
//!
//! - **backup**: scan the source, diff against the latest snapshot, write the
//!   artifacts for the changes, then persist the new snapshot
//! - **restore**: select the chain for a date and replay it into a target
//!
//! ## Ordering guarantees
//!
//! Artifacts of a backup are written one by one, each atomically, and the
//! snapshot is saved last. A saved snapshot therefore implies that all of its
//! artifacts exist, and no others. A failed run removes what it wrote, and a
//! run killed before the snapshot leaves orphan artifacts that the next run
//! for the same date discards before writing its own.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use snapchain::{RestoreOptions, SnapchainBuilder};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapchain = SnapchainBuilder::new()
//!     .exclude(vec![PathBuf::from(".cache")])
//!     .build(PathBuf::from("/media/usb/data"), PathBuf::from("/mnt/store/Backup/data"))?;
//!
//! let report = snapchain.backup_today()?;
//! println!("{} files, {} changes", report.file_count, report.changes.total_operations());
//!
//! snapchain.restore(Path::new("/tmp/restore"), RestoreOptions::default())?;
//! # Ok(())
//! # }
//! ```

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::compression::ArchiveCompression;
use crate::config::SnapchainConfig;
use crate::diff::{diff_inventories, initial_changes};
use crate::error::{Result, SnapchainError};
use crate::file_tracking::FileTracker;
use crate::storage::Store;
use crate::timeline::BackupChain;
use crate::types::*;
use crate::verification::{ChainVerifier, VerificationReport};
use chrono::{Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Incremental backup of one source tree into one store
pub struct Snapchain {
    config: SnapchainConfig,
    store: Store,
    tracker: FileTracker,
    writer: ArchiveWriter,
}

impl std::fmt::Debug for Snapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapchain")
            .field("source_path", &self.config.source_path)
            .field("store_path", &self.config.store_path)
            .field("compression", &self.writer.compression())
            .finish()
    }
}

impl Snapchain {
    /// Create an instance from a configuration
    ///
    /// Nothing is created on disk until the first backup.
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::InvalidConfiguration`] if the configuration is invalid
    pub fn new(config: SnapchainConfig) -> Result<Self> {
        config.validate()?;

        // The store may live inside the source tree; never archive it
        let store_path = if config.store_path.is_absolute() {
            config.store_path.clone()
        } else {
            std::env::current_dir()?.join(&config.store_path)
        };
        let mut excludes = config.exclude.clone();
        excludes.push(store_path.clone());

        let tracker = FileTracker::new(config.source_path.clone()).with_excludes(excludes);
        let writer = ArchiveWriter::new(config.compression);
        let store = Store::new(store_path);

        Ok(Self {
            config,
            store,
            tracker,
            writer,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &SnapchainConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Back up the source for today's local date
    pub fn backup_today(&self) -> Result<BackupReport> {
        self.backup(Local::now().date_naive())
    }

    /// Back up the source for `date`
    ///
    /// The first backup of a store writes the Base archive holding every
    /// file (even when there are none, so the chain always has a start).
    /// Later backups write Deleted, Added and Modified artifacts for the
    /// non-empty change sets. The snapshot is saved last.
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::DuplicateRun`] if `date` was already backed up;
    ///   nothing is scanned or written
    /// - [`SnapchainError::OutOfOrderDate`] if `date` precedes the latest snapshot
    /// - [`SnapchainError::StoreCorruption`] if the Base archive is missing
    ///   or belongs to another date than the first snapshot
    /// - [`SnapchainError::Scan`] and [`SnapchainError::ArchiveIo`] from the run itself
    #[instrument(skip(self))]
    pub fn backup(&self, date: NaiveDate) -> Result<BackupReport> {
        let start = Instant::now();
        if self.store.snapshot_exists(date) {
            return Err(SnapchainError::DuplicateRun { date });
        }

        let latest = self.store.load_latest()?;
        if let Some((latest_date, _)) = &latest {
            if *latest_date > date {
                return Err(SnapchainError::OutOfOrderDate {
                    date,
                    latest: *latest_date,
                });
            }
        }

        info!("Start backup for {}", date);
        Store::init(self.store.root().to_path_buf())?;
        let inventory = self.tracker.scan()?;
        let bases = self.store.base_artifacts()?;

        let (is_base, changes) = match &latest {
            None => {
                if let Some(orphan) = bases.iter().find(|a| a.date != date) {
                    return Err(SnapchainError::corruption(
                        &orphan.path,
                        "base archive exists but the store has no snapshots",
                    ));
                }
                (true, initial_changes(&inventory))
            }
            Some((latest_date, previous)) => {
                if bases.is_empty() {
                    return Err(SnapchainError::corruption(
                        self.store.root(),
                        format!("snapshots exist up to {} but no base archive", latest_date),
                    ));
                }
                let changes = diff_inventories(previous, &inventory);
                if !changes.has_changes() {
                    info!("No changes since {}", latest_date);
                }
                (false, changes)
            }
        };

        // No snapshot exists for `date`, so any artifact already dated with it
        // is left over from a failed run
        self.discard_artifacts(date)?;
        let artifacts = match self.write_artifacts(date, is_base, &inventory, &changes) {
            Ok(artifacts) => artifacts,
            Err(e) => {
                warn!("Backup for {} failed, discarding its artifacts: {}", date, e);
                if let Err(cleanup) = self.discard_artifacts(date) {
                    warn!("Could not discard artifacts for {}: {}", date, cleanup);
                }
                return Err(e);
            }
        };

        let snapshot_path = self.store.save(date, &inventory)?;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Backup for {} finished: {} files, {} added, {} modified, {} deleted in {}ms",
            date,
            inventory.len(),
            changes.added.len(),
            changes.modified.len(),
            changes.removed.len(),
            duration_ms
        );

        Ok(BackupReport {
            date,
            is_base,
            file_count: inventory.len(),
            changes,
            artifacts,
            snapshot_path,
            duration_ms,
        })
    }

    /// Rebuild the source tree as of a date inside `target`
    ///
    /// Replays every date of the chain in order: the date's archives are
    /// extracted over the target, then its deletion record is applied.
    /// Restored paths are the source paths with their root stripped, joined
    /// onto `target`.
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::InvalidRestoreDate`] if `options.target_date` is not
    ///   a snapshot date; nothing is extracted
    /// - [`SnapchainError::EmptyStore`] if no backup has run
    /// - [`SnapchainError::DeleteMissing`] with `strict_deletes` when a deleted
    ///   file is absent from the target
    #[instrument(skip(self, options), fields(target_date = ?options.target_date))]
    pub fn restore(&self, target: &Path, options: RestoreOptions) -> Result<RestoreReport> {
        let start = Instant::now();
        let chain = BackupChain::select(&self.store, options.target_date)?;
        let restored_date = chain.effective_date();
        info!("Restore on date {} into {:?}", restored_date, target);

        fs::create_dir_all(target)?;

        let mut report = RestoreReport {
            restored_date,
            dates_replayed: Vec::new(),
            archives_extracted: 0,
            files_extracted: 0,
            files_deleted: 0,
            missing_deletes: Vec::new(),
            duration_ms: 0,
        };

        for link in chain.links() {
            debug!("Replaying {}", link.date);
            for archive in &link.archives {
                report.files_extracted += ArchiveReader::extract(archive, target)?;
                report.archives_extracted += 1;
            }
            if let Some(record) = &link.deletion {
                let paths = ArchiveReader::read_deletion_record(&record.path)?;
                let outcome = ArchiveReader::apply_deletions(
                    &paths,
                    target,
                    link.date,
                    options.strict_deletes,
                )?;
                report.files_deleted += outcome.deleted;
                report.missing_deletes.extend(outcome.missing);
            }
            report.dates_replayed.push(link.date);
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Restore is finished: {} archives, {} files extracted, {} deleted in {}ms",
            report.archives_extracted, report.files_extracted, report.files_deleted, report.duration_ms
        );
        Ok(report)
    }

    /// Per-date overview of the store
    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        let artifacts = self.store.list_artifacts()?;
        let mut history = Vec::new();
        for date in self.store.list_dates()? {
            let file_count = self
                .store
                .load_by_date(date)?
                .map(|inv| inv.len())
                .unwrap_or_default();
            history.push(HistoryEntry {
                date,
                file_count,
                artifacts: artifacts.iter().filter(|a| a.date == date).cloned().collect(),
            });
        }
        Ok(history)
    }

    /// Check the store's artifacts against its snapshots
    #[instrument(skip(self))]
    pub fn verify(&self) -> Result<VerificationReport> {
        ChainVerifier::new(&self.store).verify()
    }

    fn artifact_path(&self, date: NaiveDate, kind: ArtifactKind) -> PathBuf {
        self.store.artifact_path(date, kind, self.writer.compression())
    }

    fn artifact(&self, date: NaiveDate, kind: ArtifactKind, path: PathBuf) -> Artifact {
        Artifact {
            date,
            kind,
            compression: kind.is_archive().then(|| self.writer.compression()),
            path,
        }
    }

    fn write_artifacts(
        &self,
        date: NaiveDate,
        is_base: bool,
        inventory: &Inventory,
        changes: &ChangeSet,
    ) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();
        if is_base {
            artifacts.push(self.write_archive(date, ArtifactKind::Base, inventory.paths())?);
            return Ok(artifacts);
        }

        if !changes.removed.is_empty() {
            let path = self.artifact_path(date, ArtifactKind::Deleted);
            self.writer
                .write_deletion_record(changes.removed.iter().map(PathBuf::as_path), &path)?;
            artifacts.push(self.artifact(date, ArtifactKind::Deleted, path));
        }
        if !changes.added.is_empty() {
            artifacts.push(self.write_archive(
                date,
                ArtifactKind::Added,
                changes.added.iter().map(PathBuf::as_path),
            )?);
        }
        if !changes.modified.is_empty() {
            artifacts.push(self.write_archive(
                date,
                ArtifactKind::Modified,
                changes.modified.iter().map(PathBuf::as_path),
            )?);
        }
        Ok(artifacts)
    }

    /// Remove every artifact dated `date`, in any format
    fn discard_artifacts(&self, date: NaiveDate) -> Result<usize> {
        let stale = self.store.artifacts_for(date)?;
        for artifact in &stale {
            debug!("Removing unsaved artifact {:?}", artifact.path);
            fs::remove_file(&artifact.path)?;
        }
        Ok(stale.len())
    }

    fn write_archive<'a, I>(&self, date: NaiveDate, kind: ArtifactKind, paths: I) -> Result<Artifact>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let path = self.artifact_path(date, kind);
        let info = self.writer.write_archive(paths, &path)?;
        Ok(self.artifact(date, kind, info.path))
    }
}

/// Builder for configuring a [`Snapchain`] instance
///
/// # Examples
///
/// ```rust,no_run
/// use snapchain::{ArchiveCompression, SnapchainBuilder};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let snapchain = SnapchainBuilder::new()
///     .compression(ArchiveCompression::None)
///     .strict_deletes(false)
///     .build(PathBuf::from("./data"), PathBuf::from("./backups"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SnapchainBuilder {
    compression: ArchiveCompression,
    exclude: Vec<PathBuf>,
    strict_deletes: bool,
    restore_path: Option<PathBuf>,
}

impl SnapchainBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            compression: ArchiveCompression::default(),
            exclude: Vec::new(),
            strict_deletes: true,
            restore_path: None,
        }
    }

    /// Set the format of new archives
    pub fn compression(mut self, compression: ArchiveCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set paths to skip during scans
    ///
    /// Relative paths are resolved against the source directory. The store
    /// directory is always skipped.
    pub fn exclude(mut self, paths: Vec<PathBuf>) -> Self {
        self.exclude = paths;
        self
    }

    /// Set whether a deletion of an already missing file fails a restore
    pub fn strict_deletes(mut self, strict: bool) -> Self {
        self.strict_deletes = strict;
        self
    }

    /// Set the default restore target
    pub fn restore_path(mut self, path: PathBuf) -> Self {
        self.restore_path = Some(path);
        self
    }

    /// Build the configuration without creating an instance
    pub fn into_config(self, source_path: PathBuf, store_path: PathBuf) -> SnapchainConfig {
        SnapchainConfig {
            restore_path: self.restore_path,
            compression: self.compression,
            exclude: self.exclude,
            strict_deletes: self.strict_deletes,
            ..SnapchainConfig::new(source_path, store_path)
        }
    }

    /// Build a Snapchain instance for `source_path` backed up into `store_path`
    pub fn build(self, source_path: PathBuf, store_path: PathBuf) -> Result<Snapchain> {
        Snapchain::new(self.into_config(source_path, store_path))
    }
}

impl Default for SnapchainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
