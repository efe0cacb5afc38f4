//! Configuration for snapchain
//!
//! A [`SnapchainConfig`] is loaded from a JSON file and handed to
//! [`crate::Snapchain`] at construction. Every field except the two paths has
//! a default, so a minimal file is:
//!
//! ```json
//! {
//!   "source_path": "/media/usb/data",
//!   "store_path": "/mnt/store/Backup/data"
//! }
//! ```
//!
//! A complete file, including the mount step run before each command:
//!
//! ```json
//! {
//!   "source_path": "/media/usb/data",
//!   "store_path": "/mnt/store/Backup/data",
//!   "restore_path": "/media/usb/restore",
//!   "compression": "lz4",
//!   "exclude": ["cache"],
//!   "strict_deletes": true,
//!   "log_file": "backup.log",
//!   "mount": {
//!     "mount_point": "/mnt/store",
//!     "command": ["sudo", "mount", "-U", "01DB2557286B1350", "/mnt/store"]
//!   }
//! }
//! ```

use crate::compression::ArchiveCompression;
use crate::error::{Result, SnapchainError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings for a backup source and its store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapchainConfig {
    /// Directory tree being backed up
    pub source_path: PathBuf,
    /// Directory holding snapshots and artifacts
    pub store_path: PathBuf,
    /// Default restore target
    #[serde(default)]
    pub restore_path: Option<PathBuf>,
    /// Format of new archives
    #[serde(default)]
    pub compression: ArchiveCompression,
    /// Paths skipped by the scanner; relative entries are under `source_path`
    #[serde(default)]
    pub exclude: Vec<PathBuf>,
    /// Fail a restore when a deleted file is already missing from the target
    #[serde(default = "default_strict_deletes")]
    pub strict_deletes: bool,
    /// Append log output to this file as well as the console
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Device to mount before running
    #[serde(default)]
    pub mount: Option<MountConfig>,
}

/// External mount step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Directory that must be a mount point
    pub mount_point: PathBuf,
    /// Program and arguments that mount it
    pub command: Vec<String>,
}

fn default_strict_deletes() -> bool {
    true
}

impl SnapchainConfig {
    /// Configuration with defaults for everything but the paths
    pub fn new(source_path: PathBuf, store_path: PathBuf) -> Self {
        Self {
            source_path,
            store_path,
            restore_path: None,
            compression: ArchiveCompression::default(),
            exclude: Vec::new(),
            strict_deletes: default_strict_deletes(),
            log_file: None,
            mount: None,
        }
    }

    /// Read and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SnapchainError::InvalidConfiguration(format!("cannot read {:?}: {}", path, e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.source_path.as_os_str().is_empty() {
            return Err(SnapchainError::InvalidConfiguration(
                "source_path is empty".to_string(),
            ));
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(SnapchainError::InvalidConfiguration(
                "store_path is empty".to_string(),
            ));
        }
        if self.source_path == self.store_path {
            return Err(SnapchainError::InvalidConfiguration(
                "store_path must differ from source_path".to_string(),
            ));
        }
        if let Some(mount) = &self.mount {
            if mount.mount_point.as_os_str().is_empty() {
                return Err(SnapchainError::InvalidConfiguration(
                    "mount.mount_point is empty".to_string(),
                ));
            }
            if mount.command.first().map_or(true, |program| program.is_empty()) {
                return Err(SnapchainError::InvalidConfiguration(
                    "mount.command is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}
