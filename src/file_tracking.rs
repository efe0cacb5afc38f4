//! File tracking for snapchain
//!
//! Walks the source tree and produces the [`Inventory`] of every file and its
//! modification time. The walk is all-or-nothing: the first unreadable entry
//! aborts it with a [`SnapchainError::Scan`] naming the path.
//!
//! ## Symbolic links
//!
//! Links are never followed during traversal, which rules out cycles and
//! double counting. A link to a file is recorded like a regular file, with the
//! target's modification time (the archive later stores the target's
//! content). A link to a directory is skipped.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use snapchain::file_tracking::FileTracker;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let tracker = FileTracker::new(PathBuf::from("/media/usb"))
//!     .with_excludes(vec![PathBuf::from("/media/usb/.cache")]);
//! let inventory = tracker.scan()?;
//! println!("Found {} files", inventory.len());
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SnapchainError};
use crate::types::{FileRecord, Inventory};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Scanner producing the inventory of a source tree
#[derive(Debug, Clone)]
pub struct FileTracker {
    /// Root directory to scan
    root_path: PathBuf,
    /// Paths skipped together with their subtrees
    excludes: Vec<PathBuf>,
}

impl FileTracker {
    /// Create a tracker for `root_path` with no exclusions
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            excludes: Vec::new(),
        }
    }

    /// Skip these paths and everything below them
    ///
    /// Relative entries are resolved against the root path.
    pub fn with_excludes(mut self, excludes: Vec<PathBuf>) -> Self {
        self.excludes = excludes;
        self
    }

    /// Root directory being tracked
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Scan the tree and build its inventory
    ///
    /// Recorded paths are the canonical root joined with each file's relative
    /// path, so they are absolute and free of `.`/`..` components. Only
    /// regular files and symlinks to them are recorded; sockets, FIFOs and
    /// device nodes are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - [`SnapchainError::Scan`] for a missing root, an unreadable directory
    ///   or file, a broken symlink, or a path that is not valid UTF-8
    pub fn scan(&self) -> Result<Inventory> {
        let start = Instant::now();
        let root = fs::canonicalize(&self.root_path)
            .map_err(|e| SnapchainError::scan(&self.root_path, e.to_string()))?;
        if !root.is_dir() {
            return Err(SnapchainError::scan(&root, "source is not a directory"));
        }
        let excludes = self.resolve_excludes(&root);
        debug!("Scanning {:?} ({} exclusions)", root, excludes.len());

        let mut inventory = Inventory::new();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !excludes.iter().any(|ex| entry.path() == ex));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                SnapchainError::scan(path, e.to_string())
            })?;
            let file_type = entry.file_type();
            let path = entry.path();

            if file_type.is_dir() {
                continue;
            }
            if file_type.is_symlink() {
                match fs::metadata(path) {
                    Ok(meta) if meta.is_dir() => {
                        trace!("Skipping symlinked directory {:?}", path);
                        continue;
                    }
                    Ok(meta) if !meta.is_file() => {
                        warn!("Skipping symlink to special file {:?}", path);
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => return Err(SnapchainError::scan(path, e.to_string())),
                }
            } else if !file_type.is_file() {
                // Sockets, FIFOs and device nodes cannot be archived
                warn!("Skipping special file {:?}", path);
                continue;
            }
            if path.to_str().is_none() {
                return Err(SnapchainError::scan(path, "path is not valid UTF-8"));
            }

            let modified_ns = utils::modified_ns(path)
                .map_err(|e| SnapchainError::scan(path, e.to_string()))?;
            trace!("Scanned {:?} ({})", path, modified_ns);
            inventory.insert(FileRecord::new(path.to_path_buf(), modified_ns));
        }

        info!(
            "Scanned {} files under {:?} in {:?}",
            inventory.len(),
            root,
            start.elapsed()
        );
        Ok(inventory)
    }

    fn resolve_excludes(&self, root: &Path) -> Vec<PathBuf> {
        self.excludes
            .iter()
            .map(|ex| if ex.is_absolute() { ex.clone() } else { root.join(ex) })
            // Excluded paths may not exist (yet); fall back to the joined form
            .map(|ex| fs::canonicalize(&ex).unwrap_or(ex))
            .collect()
    }
}
