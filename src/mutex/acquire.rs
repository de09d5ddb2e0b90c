//! The lock-acquisition protocol.
//!
//! Acquisition is an open → fstat → flock → re-verify loop. The re-verify
//! step is what makes the lock safe against delete/recreate races: after the
//! OS grants the lock, the path is re-stat-ed and must still have the same
//! device and inode (and a nonzero link count) as the descriptor that was
//! locked. If it does not, the lockfile was swapped out from under us while
//! we waited, the stale descriptor is dropped, and the loop restarts against
//! whatever the path names now. The loop has no iteration bound; it returns
//! once a stable identity is locked.
//!
//! The table mutex is held across the whole loop, including the blocking
//! flock. A second thread of the same process therefore waits on the mutex
//! and then takes the reentrancy path, instead of opening a second
//! descriptor and deadlocking against its own process in flock.

use super::table::{LockEntry, LockTable};
use crate::error::{FileMutexError, Result};
use crate::identity::{self, Identity};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Open the lock target for read/write, creating it if absent.
///
/// Lockfiles are created mode 0666 with the umask cleared around the open,
/// so processes of other cooperating users can take the lock too.
fn open_lockfile(path: &Path) -> Result<File> {
    let mask = unsafe { libc::umask(0) };
    let opened = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .mode(0o666)
        .open(path);
    unsafe { libc::umask(mask) };

    opened.map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => FileMutexError::PermissionDenied(path.display().to_string()),
        ErrorKind::IsADirectory => FileMutexError::InvalidTarget(format!(
            "'{}' is not a regular file",
            path.display()
        )),
        _ => FileMutexError::Os(format!(
            "could not open '{}' for locking: {}",
            path.display(),
            e
        )),
    })
}

impl LockTable {
    /// Acquire the exclusive lock for `path`, creating the lockfile if it
    /// does not exist.
    ///
    /// Reentrant: a process that already holds the lock gets its reference
    /// count bumped and returns immediately without touching the OS lock.
    ///
    /// # Arguments
    ///
    /// * `path` - The lock target
    /// * `non_blocking` - Fail with `WouldBlock` instead of waiting when the
    ///   lock is held by another process
    ///
    /// # Returns
    ///
    /// * `Ok(Identity)` - The identity now held; pass it to
    ///   [`release_identity`](LockTable::release_identity) or release by path
    /// * `Err(FileMutexError::WouldBlock)` - `non_blocking` was set and the
    ///   lock is contended
    /// * `Err(_)` - Path validation or a syscall failed
    pub fn acquire<P: AsRef<Path>>(&self, path: P, non_blocking: bool) -> Result<Identity> {
        let path = path.as_ref();
        identity::validate_lock_path(path)?;
        identity::ensure_parent_dir(path)?;

        let pid = std::process::id();
        let mut entries = self.entries();
        loop {
            let file = open_lockfile(path)?;
            let ident = identity::identity_of_file(&file, path)?;

            if let Some(entry) = entries.get_mut(&ident) {
                if entry.owner_pid == pid {
                    // Reentrancy path: the fresh descriptor is redundant and
                    // the OS lock is already held through the entry.
                    entry.count += 1;
                    tracing::debug!(path = %path.display(), count = entry.count, "reentrant acquire");
                    return Ok(ident);
                }
                // Entry inherited across a fork. The bookkeeping belongs to
                // the parent process; discard it and lock from scratch.
                entries.remove(&ident);
            }

            if non_blocking {
                if let Err(e) = file.try_lock_exclusive() {
                    return Err(if e.kind() == ErrorKind::WouldBlock {
                        FileMutexError::WouldBlock(path.display().to_string())
                    } else {
                        FileMutexError::Os(format!(
                            "could not lock '{}': {}",
                            path.display(),
                            e
                        ))
                    });
                }
            } else {
                file.lock_exclusive().map_err(|e| {
                    FileMutexError::Os(format!("could not lock '{}': {}", path.display(), e))
                })?;
            }

            if identity::still_refers(path, ident)? {
                entries.insert(
                    ident,
                    LockEntry {
                        file,
                        count: 1,
                        owner_pid: pid,
                        path: path.to_path_buf(),
                    },
                );
                tracing::debug!(path = %path.display(), "acquired lock");
                return Ok(ident);
            }

            // The path was deleted or replaced while we waited for the OS
            // lock. Dropping the descriptor releases the stale lock.
            tracing::debug!(path = %path.display(), "lockfile replaced while waiting, retrying");
        }
    }
}
