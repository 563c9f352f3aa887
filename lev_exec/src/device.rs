//! # Device helpers
//!
//! Errors and file access shared by the sysfs based sensor and fan drivers.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{fs, io, path::{Path, PathBuf}};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while opening a device. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Could not access {0:?}: {1}")]
    Io(PathBuf, io::Error),

    #[error("Invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("Device {0} is not supported on this platform")]
    Unsupported(&'static str),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Read a sysfs attribute, trimming the trailing newline.
pub(crate) fn read_attr(path: &Path) -> io::Result<String> {
    fs::read_to_string(path).map(|s| s.trim().to_string())
}

/// Write a sysfs attribute.
pub(crate) fn write_attr<T: ToString>(path: &Path, value: T) -> io::Result<()> {
    fs::write(path, value.to_string())
}

// ---------------------------------------------------------------------------
// TEST HELPERS
// ---------------------------------------------------------------------------

/// Create an empty scratch directory standing in for a sysfs tree.
#[cfg(test)]
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("lev_exec_{}_{}", name, std::process::id()));

    if dir.exists() {
        fs::remove_dir_all(&dir).expect("Cannot clear scratch directory");
    }
    fs::create_dir_all(&dir).expect("Cannot create scratch directory");

    dir
}
