//! Exclusive memory-mapped file views.

use crate::error::{FileMutexError, Result};
use crate::mutex::{LockGuard, lock_guard};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// A mutable byte view of an exclusively locked file.
///
/// The view owns the lock guard, so the file stays exclusively held for as
/// long as the mapping is alive. Changes become visible to the file through
/// the mapping; call [`flush`](ExclusiveMmap::flush) to force them to disk.
#[derive(Debug)]
pub struct ExclusiveMmap {
    // Field order matters: the mapping must be torn down before the lock
    // is released.
    map: MmapMut,
    _guard: LockGuard<'static>,
}

impl ExclusiveMmap {
    /// Flush mapped changes to disk.
    pub fn flush(&self) -> Result<()> {
        self.map
            .flush()
            .map_err(|e| FileMutexError::Os(format!("could not flush mapping: {}", e)))
    }
}

impl Deref for ExclusiveMmap {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.map
    }
}

impl DerefMut for ExclusiveMmap {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

/// Exclusively memory-map a file for read/write access.
///
/// The file must exist and be non-empty: a zero-length file has nothing to
/// map and is rejected as `InvalidTarget` (an empty lockfile auto-created
/// by the failed attempt is reclaimed again on release).
pub fn map<P: AsRef<Path>>(path: P) -> Result<ExclusiveMmap> {
    let path = path.as_ref();
    let guard = lock_guard(path)?;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            FileMutexError::Os(format!(
                "could not open '{}' for mapping: {}",
                path.display(),
                e
            ))
        })?;

    let len = file
        .metadata()
        .map_err(|e| FileMutexError::Os(format!("could not stat '{}': {}", path.display(), e)))?
        .len();
    if len == 0 {
        return Err(FileMutexError::InvalidTarget(format!(
            "'{}' is empty and cannot be mapped",
            path.display()
        )));
    }

    // The exclusive lock is what makes the mapping sound: no cooperating
    // process will truncate or replace the file while we hold it.
    let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
        FileMutexError::Os(format!("could not map '{}': {}", path.display(), e))
    })?;

    Ok(ExclusiveMmap { map, _guard: guard })
}
