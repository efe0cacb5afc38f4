//! Mounting the store's device
//!
//! Stores usually live on removable or network drives. When a
//! [`MountConfig`] is present, the configured command is run before any
//! command touches the store, unless the mount point is already mounted.

use crate::config::MountConfig;
use crate::error::{Result, SnapchainError};
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Whether `path` is the root of a mounted file system
///
/// On Unix a directory is a mount point when it lives on a different device
/// than its parent, or when it is the file system root. A missing path is
/// never a mount point.
pub fn is_mount_point(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    meta.is_dir() && is_device_root(path, &meta)
}

#[cfg(unix)]
fn is_device_root(path: &Path, meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;

    match fs::metadata(path.join("..")) {
        Ok(parent) => parent.dev() != meta.dev() || parent.ino() == meta.ino(),
        Err(_) => false,
    }
}

// Without device ids an existing directory is taken as mounted
#[cfg(not(unix))]
fn is_device_root(_path: &Path, _meta: &fs::Metadata) -> bool {
    true
}

/// Run the mount command unless the mount point is already mounted
///
/// Returns whether the command was run.
///
/// # Errors
///
/// - [`SnapchainError::Mount`] if the command cannot be spawned or exits
///   with a failure status; the message carries its stderr
pub fn ensure_mounted(config: &MountConfig) -> Result<bool> {
    if is_mount_point(&config.mount_point) {
        debug!("{:?} is already mounted", config.mount_point);
        return Ok(false);
    }

    info!("Mount point {:?} not mounted, mounting", config.mount_point);
    let (program, args) = config.command.split_first().ok_or_else(|| {
        SnapchainError::InvalidConfiguration("mount.command is empty".to_string())
    })?;

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SnapchainError::Mount {
            mount_point: config.mount_point.clone(),
            message: format!("{}: {}", program, e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SnapchainError::Mount {
            mount_point: config.mount_point.clone(),
            message: format!(
                "{} failed with exit code {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        });
    }

    info!("Mount success");
    Ok(true)
}
