//! Exclusive I/O helpers.
//!
//! Thin wrappers that bracket an ordinary filesystem operation between lock
//! acquisition and release on the target path: take a guard, do the I/O,
//! drop the guard. The lock is released on every exit path, including when
//! the I/O itself fails, because the guard's drop does the releasing.
//!
//! The lockfile and the data file are the same path here: reading a path
//! that did not exist yields an empty string, and the lockfile auto-created
//! for it is reclaimed again when the guard drops. A file that ends up with
//! content is always preserved.

mod mmap;


pub use mmap::{ExclusiveMmap, map};

use crate::error::{FileMutexError, Result};
use crate::mutex::{lock_guard, lock_guard_all};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

fn io_error(action: &str, path: &Path, e: std::io::Error) -> FileMutexError {
    match e.kind() {
        ErrorKind::PermissionDenied => FileMutexError::PermissionDenied(path.display().to_string()),
        ErrorKind::NotFound => FileMutexError::NotFound(path.display().to_string()),
        _ => FileMutexError::Os(format!("could not {} '{}': {}", action, path.display(), e)),
    }
}

/// Exclusively read a file as text.
///
/// A path that does not exist reads as the empty string (the lockfile
/// created for it is reclaimed on release).
pub fn read<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let _guard = lock_guard(path)?;
    fs::read_to_string(path).map_err(|e| io_error("read", path, e))
}

/// Exclusively read a file as bytes.
pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let _guard = lock_guard(path)?;
    fs::read(path).map_err(|e| io_error("read", path, e))
}

/// Exclusively write `contents` to a file, replacing what was there.
///
/// The data is synced to disk before the lock is released.
pub fn write<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
    let path = path.as_ref();
    let _guard = lock_guard(path)?;
    let mut file = File::create(path).map_err(|e| io_error("open", path, e))?;
    file.write_all(contents.as_ref())
        .map_err(|e| io_error("write", path, e))?;
    file.sync_all().map_err(|e| io_error("sync", path, e))
}

/// Exclusively append `contents` to a file.
pub fn append<P: AsRef<Path>, C: AsRef<[u8]>>(path: P, contents: C) -> Result<()> {
    let path = path.as_ref();
    let _guard = lock_guard(path)?;
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| io_error("open", path, e))?;
    file.write_all(contents.as_ref())
        .map_err(|e| io_error("append to", path, e))?;
    file.sync_all().map_err(|e| io_error("sync", path, e))
}

/// Lock both paths (source first), then copy the source over the
/// destination.
pub fn copy<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    let _guard = lock_guard_all([from, to])?;
    fs::copy(from, to)
        .map(|_| ())
        .map_err(|e| io_error("copy", from, e))
}

/// Lock both paths (source first), then rename the source onto the
/// destination.
pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    let _guard = lock_guard_all([from, to])?;
    fs::rename(from, to).map_err(|e| io_error("rename", from, e))
}

/// Lock a path, then remove it.
pub fn remove<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let _guard = lock_guard(path)?;
    fs::remove_file(path).map_err(|e| io_error("remove", path, e))
}
