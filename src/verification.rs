//! Store verification
//!
//! Checks that the artifacts in a store are exactly what the snapshots imply.
//! Each snapshot is diffed against its predecessor and the result is compared
//! with the archives and deletion record written on that date:
//!
//! - the first date holds the only Base archive, containing the whole first
//!   snapshot
//! - Added and Modified archives contain exactly the added and modified paths
//! - the deletion record lists exactly the removed paths
//! - a date without changes of a kind has no artifact of that kind
//! - no artifact exists for a date without a snapshot
//!
//! Verification only reads the store. Problems are collected into a
//! [`VerificationReport`] instead of aborting at the first one.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use snapchain::storage::Store;
//! use snapchain::verification::ChainVerifier;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new(PathBuf::from("/mnt/store/Backup/data"));
//! let report = ChainVerifier::new(&store).verify()?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

use crate::archive::ArchiveReader;
use crate::diff::diff_inventories;
use crate::error::Result;
use crate::storage::Store;
use crate::types::{Artifact, ArtifactKind, Inventory};
use crate::utils;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Chain verifier over a store
#[derive(Debug)]
pub struct ChainVerifier<'a> {
    store: &'a Store,
}

/// A single problem found during verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationIssue {
    /// Date the problem belongs to, if any
    pub date: Option<NaiveDate>,
    /// File involved
    pub path: PathBuf,
    /// Description
    pub message: String,
}

/// Result of verifying a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Snapshot dates examined
    pub dates_checked: usize,
    /// Archives opened and compared
    pub archives_checked: usize,
    /// Deletion records parsed and compared
    pub records_checked: usize,
    /// Problems found
    pub issues: Vec<VerificationIssue>,
    /// Total verification time in milliseconds
    pub verification_time_ms: u64,
}

impl VerificationReport {
    /// Check if no problem was found
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Get a one-line summary
    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!(
                "Store is valid: {} dates, {} archives, {} deletion records verified in {}ms",
                self.dates_checked,
                self.archives_checked,
                self.records_checked,
                self.verification_time_ms
            )
        } else {
            format!(
                "Store has {} issues across {} dates ({}ms)",
                self.issues.len(),
                self.dates_checked,
                self.verification_time_ms
            )
        }
    }

    fn issue(&mut self, date: Option<NaiveDate>, path: impl Into<PathBuf>, message: impl Into<String>) {
        let issue = VerificationIssue {
            date,
            path: path.into(),
            message: message.into(),
        };
        warn!("Verification issue at {:?}: {}", issue.path, issue.message);
        self.issues.push(issue);
    }
}

impl<'a> ChainVerifier<'a> {
    /// Create a verifier for a store
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Verify every date in the store
    ///
    /// Only failures to enumerate the store are returned as errors; anything
    /// wrong with an individual snapshot or artifact becomes an issue.
    pub fn verify(&self) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport::default();

        let dates = self.store.list_dates()?;
        let artifacts = self.store.list_artifacts()?;
        info!("Verifying {} dates in {:?}", dates.len(), self.store.root());

        self.check_artifact_dates(&dates, &artifacts, &mut report);

        // None while the predecessor snapshot is unreadable
        let mut previous: Option<Inventory> = None;
        for (index, &date) in dates.iter().enumerate() {
            report.dates_checked += 1;
            let current = match self.store.load_by_date(date) {
                Ok(Some(inventory)) => inventory,
                Ok(None) => {
                    report.issue(Some(date), self.store.snapshot_path(date), "snapshot vanished");
                    previous = None;
                    continue;
                }
                Err(e) => {
                    report.issue(Some(date), self.store.snapshot_path(date), e.to_string());
                    previous = None;
                    continue;
                }
            };

            let for_date: Vec<&Artifact> = artifacts.iter().filter(|a| a.date == date).collect();
            if index == 0 {
                let expected = current.path_set();
                self.check_archive(date, ArtifactKind::Base, &expected, &for_date, true, &mut report);
            } else if let Some(prev) = &previous {
                let changes = diff_inventories(prev, &current);
                self.check_archive(date, ArtifactKind::Added, &changes.added, &for_date, false, &mut report);
                self.check_archive(date, ArtifactKind::Modified, &changes.modified, &for_date, false, &mut report);
                self.check_deletions(date, &changes.removed, &for_date, &mut report);
            } else {
                debug!("Skipping artifact comparison for {}: predecessor unreadable", date);
            }

            previous = Some(current);
        }

        report.verification_time_ms = start.elapsed().as_millis() as u64;
        info!("{}", report.summary());
        Ok(report)
    }

    fn check_artifact_dates(
        &self,
        dates: &[NaiveDate],
        artifacts: &[Artifact],
        report: &mut VerificationReport,
    ) {
        for artifact in artifacts {
            if dates.binary_search(&artifact.date).is_err() {
                report.issue(
                    Some(artifact.date),
                    &artifact.path,
                    "artifact has no snapshot (interrupted run?)",
                );
            }
        }

        let bases: Vec<_> = artifacts.iter().filter(|a| a.kind == ArtifactKind::Base).collect();
        match (dates.first(), bases.as_slice()) {
            (None, _) => {}
            (Some(first), []) => {
                report.issue(Some(*first), self.store.root(), "store has no base archive")
            }
            (Some(first), [base]) if base.date != *first => report.issue(
                Some(base.date),
                &base.path,
                format!("base archive is not dated with the first snapshot {}", first),
            ),
            (Some(_), [_]) => {}
            (Some(_), [_, rest @ ..]) => {
                for extra in rest {
                    report.issue(Some(extra.date), &extra.path, "more than one base archive");
                }
            }
        }
    }

    /// Compare one archive kind of a date against the expected source paths
    ///
    /// With `required`, an empty expectation still needs the archive.
    fn check_archive(
        &self,
        date: NaiveDate,
        kind: ArtifactKind,
        expected: &BTreeSet<PathBuf>,
        for_date: &[&Artifact],
        required: bool,
        report: &mut VerificationReport,
    ) {
        let found: Vec<&&Artifact> = for_date.iter().filter(|a| a.kind == kind).collect();
        let artifact = match found.as_slice() {
            [] if expected.is_empty() && !required => return,
            [] => {
                report.issue(
                    Some(date),
                    self.store.root(),
                    format!("missing {} archive ({} files expected)", kind, expected.len()),
                );
                return;
            }
            [one] => **one,
            [first, ..] => {
                report.issue(
                    Some(date),
                    &first.path,
                    format!("{} {} archives for one date", found.len(), kind),
                );
                return;
            }
        };

        report.archives_checked += 1;
        let entries = match ArchiveReader::list_entries(artifact) {
            Ok(entries) => entries,
            Err(e) => {
                report.issue(Some(date), &artifact.path, e.to_string());
                return;
            }
        };

        let expected: BTreeSet<PathBuf> =
            expected.iter().map(|p| utils::archive_member_name(p)).collect();
        let missing = expected.difference(&entries).count();
        let unexpected = entries.difference(&expected).count();
        if missing > 0 || unexpected > 0 {
            report.issue(
                Some(date),
                &artifact.path,
                format!(
                    "{} archive differs from snapshots: {} missing, {} unexpected",
                    kind, missing, unexpected
                ),
            );
        }
    }

    fn check_deletions(
        &self,
        date: NaiveDate,
        removed: &BTreeSet<PathBuf>,
        for_date: &[&Artifact],
        report: &mut VerificationReport,
    ) {
        let Some(record) = for_date.iter().find(|a| a.kind == ArtifactKind::Deleted) else {
            if !removed.is_empty() {
                report.issue(
                    Some(date),
                    self.store.root(),
                    format!("missing deletion record ({} paths expected)", removed.len()),
                );
            }
            return;
        };

        report.records_checked += 1;
        match ArchiveReader::read_deletion_record(&record.path) {
            Ok(paths) => {
                let listed: BTreeSet<PathBuf> = paths.into_iter().collect();
                if &listed != removed {
                    report.issue(
                        Some(date),
                        &record.path,
                        format!(
                            "deletion record lists {} paths, snapshots imply {}",
                            listed.len(),
                            removed.len()
                        ),
                    );
                }
            }
            Err(e) => report.issue(Some(date), &record.path, e.to_string()),
        }
    }
}
