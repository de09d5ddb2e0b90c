//! Path-to-identity resolution.
//!
//! A lock is keyed by the physical file object behind a path, not by the
//! path string: two paths that hard-link the same inode are the same lock,
//! and a path that is deleted and recreated is a different lock. This module
//! resolves paths and open descriptors to that identity and re-checks
//! whether a path still refers to the object it named earlier, which is how
//! the acquire protocol detects delete/recreate races.

use crate::error::{FileMutexError, Result};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// The (device, inode) pair identifying a physical file object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    /// Device id of the filesystem holding the file.
    pub device: u64,

    /// Inode number of the file on that device.
    pub inode: u64,
}

impl Identity {
    fn from_metadata(meta: &fs::Metadata) -> Self {
        Self {
            device: meta.dev(),
            inode: meta.ino(),
        }
    }
}

/// Resolve a path to the identity of the file it currently names.
///
/// # Returns
///
/// * `Ok(Identity)` - The path names an existing regular file
/// * `Err(FileMutexError::NotFound)` - The path does not exist
/// * `Err(FileMutexError::InvalidTarget)` - The path exists but is not a regular file
/// * `Err(FileMutexError::PermissionDenied)` - The path is not accessible
pub fn identity_of<P: AsRef<Path>>(path: P) -> Result<Identity> {
    let path = path.as_ref();
    let meta = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => FileMutexError::NotFound(path.display().to_string()),
        ErrorKind::PermissionDenied => FileMutexError::PermissionDenied(path.display().to_string()),
        _ => FileMutexError::Os(format!("could not stat '{}': {}", path.display(), e)),
    })?;

    if !meta.is_file() {
        return Err(FileMutexError::InvalidTarget(format!(
            "'{}' is not a regular file",
            path.display()
        )));
    }

    Ok(Identity::from_metadata(&meta))
}

/// Resolve the identity of an already-open descriptor.
///
/// `path` is only used for error messages.
pub(crate) fn identity_of_file(file: &File, path: &Path) -> Result<Identity> {
    let meta = file.metadata().map_err(|e| {
        FileMutexError::Os(format!(
            "could not stat open descriptor for '{}': {}",
            path.display(),
            e
        ))
    })?;
    Ok(Identity::from_metadata(&meta))
}

/// Check whether a path still refers to the object it named earlier.
///
/// Re-stats the path and compares device and inode against `identity`,
/// additionally requiring a link count greater than zero. A path that no
/// longer exists is `Ok(false)`, not an error: the caller is asking a
/// question, not asserting an invariant.
pub fn still_refers<P: AsRef<Path>>(path: P, identity: Identity) -> Result<bool> {
    let path = path.as_ref();
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.nlink() > 0 && Identity::from_metadata(&meta) == identity),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FileMutexError::Os(format!(
            "could not stat '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Validate that a path is usable as a lock target.
///
/// Rejects the empty path and paths ending in a separator (they can never
/// name a regular file), and rejects an existing path that is not a regular
/// file. A path that does not exist yet is fine: the acquire protocol
/// creates it.
pub(crate) fn validate_lock_path(path: &Path) -> Result<()> {
    let raw = path.as_os_str().as_encoded_bytes();
    if raw.is_empty() {
        return Err(FileMutexError::InvalidPath("path is empty".to_string()));
    }
    if raw.ends_with(b"/") {
        return Err(FileMutexError::InvalidPath(format!(
            "'{}' ends in a path separator",
            path.display()
        )));
    }

    match fs::metadata(path) {
        Ok(meta) if !meta.is_file() => Err(FileMutexError::InvalidTarget(format!(
            "'{}' is not a regular file",
            path.display()
        ))),
        _ => Ok(()),
    }
}

/// Create the containing directory of a lock path if it does not exist.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => FileMutexError::PermissionDenied(format!(
                "cannot create directory '{}'",
                parent.display()
            )),
            _ => FileMutexError::Os(format!(
                "could not create directory '{}': {}",
                parent.display(),
                e
            )),
        })?;
    }
    Ok(())
}
