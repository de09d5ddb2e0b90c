//! The lock-release protocol.
//!
//! Release decrements the reentrant reference count; the OS lock is only
//! touched when the count reaches zero. The final release flushes the
//! descriptor and, unless told to keep empty files, unlinks a lockfile that
//! was never written to, so lockfiles used purely as mutexes do not
//! accumulate on disk. A lockfile with content is always preserved.

use super::table::{LockEntry, LockTable};
use crate::error::{FileMutexError, Result};
use crate::identity::{self, Identity};
use fs2::FileExt;
use std::fs;
use std::path::Path;

impl LockTable {
    /// Release one level of a prior acquisition of `path`.
    ///
    /// The path is re-resolved to its identity first, so this fails with
    /// `NotFound` if the path no longer exists. Releasing a path this
    /// process does not hold is a no-op, not an error: defensive releases
    /// are an accepted pattern.
    pub fn release<P: AsRef<Path>>(&self, path: P, keep_empty: bool) -> Result<()> {
        let identity = identity::identity_of(path)?;
        self.release_identity(identity, keep_empty)
    }

    /// Release one level of a prior acquisition of `identity`.
    ///
    /// No-ops if the identity is not held. At reference count zero the
    /// descriptor is flushed, an empty lockfile is reclaimed unless
    /// `keep_empty` is set, and the OS lock is dropped.
    pub fn release_identity(&self, identity: Identity, keep_empty: bool) -> Result<()> {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(&identity) else {
            return Ok(());
        };

        if entry.count > 1 {
            entry.count -= 1;
            tracing::debug!(path = %entry.path.display(), count = entry.count, "nested release");
            return Ok(());
        }

        // Last release: the entry leaves the table before its descriptor is
        // closed, so the table never holds a closed descriptor.
        let Some(entry) = entries.remove(&identity) else {
            return Ok(());
        };
        teardown_entry(entry, identity, keep_empty)
    }
}

/// Flush, optionally reclaim, and unlock a removed entry's descriptor.
pub(crate) fn teardown_entry(
    entry: LockEntry,
    identity: Identity,
    keep_empty: bool,
) -> Result<()> {
    let LockEntry { file, path, .. } = entry;

    file.sync_all().map_err(|e| {
        FileMutexError::Unlock(format!("could not fsync '{}': {}", path.display(), e))
    })?;

    // Only unlink through a path that still refers to the locked object;
    // if the name has been taken over by a different file, it is not ours
    // to remove.
    if !keep_empty && identity::still_refers(&path, identity)? {
        let size = file
            .metadata()
            .map_err(|e| {
                FileMutexError::Unlock(format!("could not stat '{}': {}", path.display(), e))
            })?
            .len();
        if size == 0 {
            fs::remove_file(&path).map_err(|e| {
                FileMutexError::Unlock(format!(
                    "could not remove empty lockfile '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
    }

    FileExt::unlock(&file).map_err(|e| {
        FileMutexError::Unlock(format!("could not unlock '{}': {}", path.display(), e))
    })?;
    tracing::debug!(path = %path.display(), "released lock");
    Ok(())
}
