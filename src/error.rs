//! Error types for snapchain
//!
//! Every failure aborts the current backup or restore run. A half-written
//! incremental backup breaks the chain, so nothing here is retried or
//! downgraded to a warning inside the library. The variants carry the path,
//! date and operation needed to diagnose a failed run without re-running it.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in snapchain
pub type Result<T> = std::result::Result<T, SnapchainError>;

/// Process exit code for a successful run
pub const EXIT_OK: i32 = 0;
/// Process exit code for any hard failure
pub const EXIT_FAILURE: i32 = 2;
/// Process exit code when a backup already ran for the date
pub const EXIT_ALREADY_RAN: i32 = 3;
/// Process exit code when the requested restore date is unknown
pub const EXIT_BAD_RESTORE_DATE: i32 = 4;

/// Main error type for all snapchain operations
#[derive(Debug, Error)]
pub enum SnapchainError {
    /// Directory traversal failed; no partial inventory is produced
    #[error("Scan failed at {path:?}: {message}")]
    Scan {
        /// Offending path
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// A snapshot already exists for the date
    #[error("Backup for {date} has already been created")]
    DuplicateRun {
        /// Date that was already backed up
        date: NaiveDate,
    },

    /// A snapshot, record or artifact in the store is unreadable or inconsistent
    #[error("Store corruption at {path:?}: {message}")]
    StoreCorruption {
        /// File or directory that is corrupt
        path: PathBuf,
        /// Description of the inconsistency
        message: String,
    },

    /// Requested restore date does not match any snapshot
    #[error("Incorrect restore date {date}: no snapshot exists for it")]
    InvalidRestoreDate {
        /// The rejected date
        date: NaiveDate,
    },

    /// Requested restore date is not a `YYYY-MM-DD` calendar date
    #[error("Incorrect restore date '{input}': expected YYYY-MM-DD")]
    MalformedRestoreDate {
        /// The text as given
        input: String,
    },

    /// Writing or reading an archive artifact failed
    #[error("Archive I/O failed for {path:?}: {source}")]
    ArchiveIo {
        /// Artifact or member file involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A deletion record names a file that is absent from the restore target
    #[error("Cannot delete {path:?} while replaying {date}: file is missing")]
    DeleteMissing {
        /// Path inside the restore target
        path: PathBuf,
        /// Date of the deletion record
        date: NaiveDate,
    },

    /// Restore was requested on a store without snapshots
    #[error("No snapshots found in store {0:?}")]
    EmptyStore(PathBuf),

    /// Backup date precedes the latest snapshot
    #[error("Backup date {date} is earlier than the latest snapshot {latest}")]
    OutOfOrderDate {
        /// Date of the attempted run
        date: NaiveDate,
        /// Latest snapshot date in the store
        latest: NaiveDate,
    },

    /// Mounting the store's device failed
    #[error("Error mounting {mount_point:?}: {message}")]
    Mount {
        /// Mount point that could not be prepared
        mount_point: PathBuf,
        /// Command output or spawn error
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O errors outside archive handling
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapchainError {
    /// Create a scan error for a path
    pub fn scan(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SnapchainError::Scan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a store corruption error for a path
    pub fn corruption(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        SnapchainError::StoreCorruption {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an archive I/O error for a path
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapchainError::ArchiveIo {
            path: path.into(),
            source,
        }
    }

    /// Exit code the CLI reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SnapchainError::DuplicateRun { .. } => EXIT_ALREADY_RAN,
            SnapchainError::InvalidRestoreDate { .. }
            | SnapchainError::MalformedRestoreDate { .. } => EXIT_BAD_RESTORE_DATE,
            _ => EXIT_FAILURE,
        }
    }

    /// Check if this error is a refusal that left the store untouched
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            SnapchainError::DuplicateRun { .. }
                | SnapchainError::InvalidRestoreDate { .. }
                | SnapchainError::MalformedRestoreDate { .. }
                | SnapchainError::OutOfOrderDate { .. }
        )
    }

    /// Check if this error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SnapchainError::StoreCorruption { .. } | SnapchainError::Csv(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnapchainError::DuplicateRun { date } => {
                format!("Archive for {} has already been created, skip.", date)
            }
            SnapchainError::InvalidRestoreDate { date } => {
                format!(
                    "Incorrect restore date {}. Use 'snapchain list' to see available dates.",
                    date
                )
            }
            SnapchainError::MalformedRestoreDate { input } => {
                format!("Incorrect restore date '{}'. Dates are written YYYY-MM-DD.", input)
            }
            SnapchainError::StoreCorruption { path, message } => {
                format!(
                    "Store corruption at {:?}: {}. Partial files from an interrupted run \
                     must be removed by hand before running again.",
                    path, message
                )
            }
            _ => self.to_string(),
        }
    }
}
