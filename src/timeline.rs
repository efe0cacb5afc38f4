//! Backup chain selection for restores
//!
//! A restore replays the store date by date. The chain for a target date is
//! every snapshot date up to and including it, each paired with the artifacts
//! written on that date.
//!
//! ## Structure
//!
//! ```text
//! 2024-03-01  base.tar.lz4
//! 2024-03-02  added.tar.lz4  deleted.csv
//! 2024-03-03  (no changes)
//! 2024-03-04  added.tar.lz4  modified.tar.lz4  deleted.csv   <- target
//! ```
//!
//! The first link must carry the store's only Base archive. Dates with no
//! changes have a snapshot but no artifacts and replay as a no-op.
//!
//! ## Examples
//!
//! ```rust
//! use snapchain::timeline::select_dates;
//! use snapchain::types::parse_date;
//!
//! let dates = vec![parse_date("2024-03-01").unwrap(), parse_date("2024-03-05").unwrap()];
//! let chain = select_dates(&dates, Some(dates[0])).unwrap();
//! assert_eq!(chain, vec![dates[0]]);
//! ```

use crate::error::{Result, SnapchainError};
use crate::storage::Store;
use crate::types::{Artifact, ArtifactKind};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, trace};

/// One date of a backup chain with its artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    /// Snapshot date
    pub date: NaiveDate,
    /// Archives for the date in extraction order (base, added, modified)
    pub archives: Vec<Artifact>,
    /// Deletion record, applied after the archives
    pub deletion: Option<Artifact>,
}

impl ChainLink {
    /// Whether the date wrote any artifact
    pub fn has_artifacts(&self) -> bool {
        !self.archives.is_empty() || self.deletion.is_some()
    }

    /// Whether this link carries the Base archive
    pub fn has_base(&self) -> bool {
        self.archives.iter().any(|a| a.kind == ArtifactKind::Base)
    }
}

/// Ordered sequence of dates replayed by a restore
#[derive(Debug, Clone)]
pub struct BackupChain {
    links: Vec<ChainLink>,
}

impl BackupChain {
    /// Select the chain ending at `target` (or at the latest snapshot)
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::InvalidRestoreDate`] if `target` is not a snapshot date
    /// - [`SnapchainError::EmptyStore`] if the store holds no snapshots
    /// - [`SnapchainError::StoreCorruption`] if the first date lacks the Base
    ///   archive or a later date carries one
    pub fn select(store: &Store, target: Option<NaiveDate>) -> Result<Self> {
        let dates = store.list_dates()?;
        let selected = select_dates(&dates, target).map_err(|e| match e {
            SnapchainError::EmptyStore(_) => SnapchainError::EmptyStore(store.root().to_path_buf()),
            other => other,
        })?;

        let artifacts = store.list_artifacts()?;
        let links = selected
            .into_iter()
            .map(|date| link_for(date, &artifacts))
            .collect();
        let chain = Self { links };
        chain.check_base(store.root())?;

        debug!(
            "Selected chain of {} dates ending {}",
            chain.links.len(),
            chain.effective_date()
        );
        Ok(chain)
    }

    /// Links in replay order
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Dates in replay order
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.links.iter().map(|l| l.date).collect()
    }

    /// Date the restored tree corresponds to
    pub fn effective_date(&self) -> NaiveDate {
        // select() never builds an empty chain
        self.links
            .last()
            .map(|l| l.date)
            .unwrap_or(NaiveDate::MIN)
    }

    fn check_base(&self, root: &Path) -> Result<()> {
        let Some(first) = self.links.first() else {
            return Ok(());
        };
        if !first.has_base() {
            return Err(SnapchainError::corruption(
                root,
                format!("first snapshot {} has no base archive", first.date),
            ));
        }
        if let Some(extra) = self.links.iter().skip(1).find(|l| l.has_base()) {
            return Err(SnapchainError::corruption(
                root,
                format!("second base archive found for {}", extra.date),
            ));
        }
        Ok(())
    }
}

/// Snapshot dates replayed to reach `target`
///
/// `dates` must be sorted ascending. Without a target every date is selected.
pub fn select_dates(dates: &[NaiveDate], target: Option<NaiveDate>) -> Result<Vec<NaiveDate>> {
    match target {
        Some(target) if dates.binary_search(&target).is_err() => {
            Err(SnapchainError::InvalidRestoreDate { date: target })
        }
        Some(target) => Ok(dates.iter().copied().filter(|d| *d <= target).collect()),
        None if dates.is_empty() => Err(SnapchainError::EmptyStore(Default::default())),
        None => Ok(dates.to_vec()),
    }
}

fn link_for(date: NaiveDate, artifacts: &[Artifact]) -> ChainLink {
    let mut link = ChainLink {
        date,
        archives: Vec::new(),
        deletion: None,
    };
    for artifact in artifacts.iter().filter(|a| a.date == date) {
        trace!("{} -> {:?}", date, artifact.path);
        if artifact.kind.is_archive() {
            link.archives.push(artifact.clone());
        } else {
            link.deletion = Some(artifact.clone());
        }
    }
    link.archives.sort_by_key(|a| a.kind);
    link
}
