//! Archive and deletion record I/O
//!
//! Archives are tar streams wrapped according to [`ArchiveCompression`].
//! Every member is stored under its full source path with the root stripped
//! (see [`utils::archive_member_name`]), so extracting several archives into
//! one target overlays them path by path, and a deletion record entry maps to
//! exactly one file inside the target.
//!
//! Deletion records are headerless CSV files holding one quoted full path per
//! row.
//!
//! Both writers go through [`utils::write_atomic`]: a failed write leaves no
//! partial artifact behind.

use crate::compression::ArchiveCompression;
use crate::error::{Result, SnapchainError};
use crate::storage::path_field;
use crate::types::Artifact;
use crate::utils;
use chrono::NaiveDate;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use tracing::{debug, info, trace, warn};

/// Summary of a written archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Location of the persisted archive
    pub path: PathBuf,
    /// Number of members
    pub entries: usize,
    /// Size on disk in bytes
    pub size: u64,
}

/// Writes archive artifacts and deletion records
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveWriter {
    compression: ArchiveCompression,
}

impl ArchiveWriter {
    /// Create a writer producing archives in the given format
    pub fn new(compression: ArchiveCompression) -> Self {
        Self { compression }
    }

    /// Format of archives written by this writer
    pub fn compression(&self) -> ArchiveCompression {
        self.compression
    }

    /// Write `paths` into a new archive at `destination`
    ///
    /// An existing file at `destination` is replaced; it can only be an
    /// orphan of an interrupted run for the same date.
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::ArchiveIo`] naming the member or the destination
    pub fn write_archive<'a, I>(&self, paths: I, destination: &Path) -> Result<ArchiveInfo>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut entries = 0usize;
        let compression = self.compression;

        let result = utils::write_atomic(destination, true, |file| {
            let mut builder = Builder::new(compression.wrap_writer(file));
            for path in paths {
                let name = utils::archive_member_name(path);
                trace!("Archiving {:?} as {:?}", path, name);
                builder
                    .append_path_with_name(path, &name)
                    .map_err(|e| SnapchainError::archive(path, e))?;
                entries += 1;
            }
            builder
                .into_inner()
                .and_then(|w| w.finish())
                .map_err(|e| SnapchainError::archive(destination, e))?;
            Ok(())
        });

        match result {
            Err(SnapchainError::Io(e)) => return Err(SnapchainError::archive(destination, e)),
            other => other?,
        }

        let size = fs::metadata(destination)
            .map_err(|e| SnapchainError::archive(destination, e))?
            .len();
        info!(
            "Created archive {:?} ({} files, {})",
            destination,
            entries,
            utils::format_bytes(size)
        );
        Ok(ArchiveInfo {
            path: destination.to_path_buf(),
            entries,
            size,
        })
    }

    /// Write the deletion record for `paths` at `destination`
    pub fn write_deletion_record<'a, I>(&self, paths: I, destination: &Path) -> Result<usize>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut rows = 0usize;
        utils::write_atomic(destination, true, |file| {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .quote_style(QuoteStyle::Always)
                .from_writer(file);
            for path in paths {
                writer.write_record([path_field(path)?])?;
                rows += 1;
            }
            writer.flush()?;
            Ok(())
        })?;

        info!("Created deletion record {:?} ({} paths)", destination, rows);
        Ok(rows)
    }
}

/// Deletions applied to a restore target for one date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Files removed
    pub deleted: usize,
    /// Target paths that were already absent
    pub missing: Vec<PathBuf>,
}

/// Reads archive artifacts and deletion records
pub struct ArchiveReader;

impl ArchiveReader {
    /// Extract every member of `artifact` into `target`, overwriting existing
    /// files; returns the number of members written
    pub fn extract(artifact: &Artifact, target: &Path) -> Result<usize> {
        let compression = archive_compression(artifact)?;
        let file = File::open(&artifact.path).map_err(|e| SnapchainError::archive(&artifact.path, e))?;
        let mut archive = Archive::new(compression.wrap_reader(BufReader::new(file)));
        archive.set_overwrite(true);
        archive.set_preserve_mtime(true);

        let mut extracted = 0usize;
        let entries = archive
            .entries()
            .map_err(|e| SnapchainError::archive(&artifact.path, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| SnapchainError::archive(&artifact.path, e))?;
            let name = entry
                .path()
                .map(|p| p.into_owned())
                .map_err(|e| SnapchainError::archive(&artifact.path, e))?;
            let unpacked = entry
                .unpack_in(target)
                .map_err(|e| SnapchainError::archive(target.join(&name), e))?;
            if !unpacked {
                return Err(SnapchainError::corruption(
                    &artifact.path,
                    format!("member {:?} escapes the restore target", name),
                ));
            }
            extracted += 1;
        }

        info!("Unpacked {:?} ({} files)", artifact.path, extracted);
        Ok(extracted)
    }

    /// Member names of an archive, without extracting it
    pub fn list_entries(artifact: &Artifact) -> Result<BTreeSet<PathBuf>> {
        let compression = archive_compression(artifact)?;
        let file = File::open(&artifact.path).map_err(|e| SnapchainError::archive(&artifact.path, e))?;
        let mut archive = Archive::new(compression.wrap_reader(BufReader::new(file)));

        let mut names = BTreeSet::new();
        for entry in archive
            .entries()
            .map_err(|e| SnapchainError::archive(&artifact.path, e))?
        {
            let entry = entry.map_err(|e| SnapchainError::archive(&artifact.path, e))?;
            let name = entry
                .path()
                .map_err(|e| SnapchainError::archive(&artifact.path, e))?
                .into_owned();
            names.insert(name);
        }
        Ok(names)
    }

    /// Paths listed in a deletion record, in file order
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::StoreCorruption`] for a row that does not hold
    ///   exactly one non-empty path
    pub fn read_deletion_record(path: &Path) -> Result<Vec<PathBuf>> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let mut paths = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| SnapchainError::corruption(path, e.to_string()))?;
            match row.get(0) {
                Some(field) if row.len() == 1 && !field.is_empty() => {
                    paths.push(PathBuf::from(field))
                }
                _ => {
                    return Err(SnapchainError::corruption(
                        path,
                        format!("row {} is not a single path", line + 1),
                    ))
                }
            }
        }
        debug!("Read deletion record {:?} ({} paths)", path, paths.len());
        Ok(paths)
    }

    /// Remove the files named by a deletion record from `target`
    ///
    /// Each full source path is mapped into the target the same way archive
    /// members are. A file that is already absent fails the restore with
    /// [`SnapchainError::DeleteMissing`] when `strict`, and is otherwise
    /// reported in [`DeletionOutcome::missing`].
    pub fn apply_deletions(
        paths: &[PathBuf],
        target: &Path,
        date: NaiveDate,
        strict: bool,
    ) -> Result<DeletionOutcome> {
        let mut outcome = DeletionOutcome::default();
        for path in paths {
            let victim = target.join(utils::archive_member_name(path));
            match fs::remove_file(&victim) {
                Ok(()) => {
                    debug!("Deleted {:?}", victim);
                    outcome.deleted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if strict {
                        return Err(SnapchainError::DeleteMissing { path: victim, date });
                    }
                    warn!("File {:?} recorded as deleted on {} is already missing", victim, date);
                    outcome.missing.push(victim);
                }
                Err(e) => return Err(SnapchainError::Io(e)),
            }
        }
        Ok(outcome)
    }
}

fn archive_compression(artifact: &Artifact) -> Result<ArchiveCompression> {
    artifact
        .compression
        .ok_or_else(|| SnapchainError::corruption(&artifact.path, "artifact is not an archive"))
}
