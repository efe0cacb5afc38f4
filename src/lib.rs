//! # Snapchain - incremental, date-stamped directory backups
//!
//! Backs up a directory tree once per day into a store, writing a full
//! archive on the first run and only the differences afterwards, and restores
//! the tree as of any backed-up date by replaying the chain of archives.
//!
//! ## Overview
//!
//! Each backup run:
//! - scans the source tree into an [`Inventory`] of paths and modification times
//! - compares it with the latest snapshot in the store
//! - writes the archives and deletion record for what changed
//! - saves the new inventory as the snapshot for the run's date
//!
//! A restore selects every snapshot date up to the requested one and, in
//! date order, extracts that date's archives into the target and then
//! removes the files the date recorded as deleted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snapchain::{RestoreOptions, Snapchain, SnapchainConfig};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SnapchainConfig::new(
//!     PathBuf::from("/media/usb/data"),       // Directory to back up
//!     PathBuf::from("/mnt/store/Backup/data"), // Where the artifacts go
//! );
//! let snapchain = Snapchain::new(config)?;
//!
//! // Once a day
//! let report = snapchain.backup_today()?;
//! println!("Backed up {} files", report.file_count);
//!
//! // Rebuild the latest state somewhere else
//! let restored = snapchain.restore(Path::new("/tmp/restore"), RestoreOptions::default())?;
//! println!("Restored as of {}", restored.restored_date);
//! # Ok(())
//! # }
//! ```
//!
//! ## Store Layout
//!
//! ```text
//! store/
//! ├── 2024-03-01.base.tar.lz4
//! ├── 2024-03-02.added.tar.lz4
//! ├── 2024-03-02.deleted.csv
//! └── snapshots/
//!     ├── 2024-03-01.snapshot.csv
//!     └── 2024-03-02.snapshot.csv
//! ```
//!
//! ## Limitations
//!
//! - Changes are detected by modification time only. A file rewritten with
//!   its old timestamp preserved is not backed up again.
//! - At most one backup per date. A second run on the same date is refused.
//! - The chain only grows: there is no operation that writes a new Base
//!   archive and discards the older links. Restoring a late date replays
//!   every archive since the first run.
//! - Runs are not locked against each other; two concurrent backups of one
//!   store are unsupported.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SnapchainError>`. Every variant names the
//! path or date involved, and [`SnapchainError::exit_code`] maps it to the
//! CLI's exit status.
//!
//! ## Module Organization
//!
//! - [`snapchain`]: backup and restore runs
//! - [`file_tracking`]: source tree scanning
//! - [`diff`]: inventory comparison
//! - [`storage`]: snapshots and artifact naming
//! - [`archive`]: archive and deletion record I/O
//! - [`timeline`]: chain selection for restores
//! - [`verification`]: store consistency checks
//! - [`compression`]: archive stream formats
//! - [`config`]: configuration file
//! - [`mount`]: mounting the store's device
//! - [`types`]: common types and data structures
//! - [`error`]: error types and exit codes

// Public API modules
pub mod archive;
pub mod compression;
pub mod config;
pub mod diff;
pub mod error;
pub mod file_tracking;
pub mod mount;
pub mod snapchain;
pub mod storage;
pub mod timeline;
pub mod types;
pub mod verification;

// Internal modules (not part of public API)
mod utils;

// Re-export main types for convenience
pub use compression::ArchiveCompression;
pub use config::{MountConfig, SnapchainConfig};
pub use error::{Result, SnapchainError};
pub use snapchain::{Snapchain, SnapchainBuilder};
pub use storage::Store;
pub use timeline::BackupChain;
pub use types::*;
pub use utils::{archive_member_name, format_bytes};
pub use verification::{ChainVerifier, VerificationReport};
