//! Inter-process mutexes backed by lockfiles.
//!
//! This module implements the locking core:
//! - Identity-keyed lock table with reentrant reference counting
//! - Acquire protocol with delete/recreate race detection
//! - Release protocol with empty-lockfile reclamation
//! - RAII guards over one or more paths
//!
//! # Scope
//!
//! The lock serializes distinct *processes*, not threads: once a process
//! holds a lock, further acquisitions from any of its threads take the
//! reentrancy path and succeed immediately. Callers needing thread-level
//! exclusion must layer their own in-process synchronization on top.
//!
//! # Fork hazard
//!
//! A child forked while the parent holds a lock inherits the open, locked
//! descriptor but not the parent's table entry, so it cannot release the
//! lock through this API. This is a documented caller responsibility:
//! do not fork while holding locks.
//!
//! # Blocking
//!
//! The blocking variants wait on the OS advisory-lock syscall with no
//! timeout. A caller wanting bounded waiting should poll [`try_lock`] with
//! its own sleep/backoff loop.

mod acquire;
mod guard;
mod options;
mod release;
mod table;

#[cfg(test)]
mod tests;

// Re-export public API
pub use guard::LockGuard;
pub use options::LockOptions;
pub use table::LockTable;

use crate::error::{FileMutexError, Result};
use std::path::Path;

/// Block until the exclusive lock on `path` is acquired.
///
/// Creates the lockfile if it does not exist. Reentrant within the calling
/// process; every `lock` must be matched by an [`unlock`].
pub fn lock<P: AsRef<Path>>(path: P) -> Result<()> {
    LockTable::global().acquire(path, false).map(|_| ())
}

/// Attempt to acquire the exclusive lock on `path` without blocking.
///
/// # Returns
///
/// * `Ok(true)` - The lock is now held (matched by an [`unlock`])
/// * `Ok(false)` - Another process holds the lock
/// * `Err(_)` - Path validation or a syscall failed
pub fn try_lock<P: AsRef<Path>>(path: P) -> Result<bool> {
    match LockTable::global().acquire(path, true) {
        Ok(_) => Ok(true),
        Err(FileMutexError::WouldBlock(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Release one level of a prior acquisition of `path`, reclaiming the
/// lockfile if it is still empty.
///
/// Releasing a path this process does not hold is a no-op.
pub fn unlock<P: AsRef<Path>>(path: P) -> Result<()> {
    LockTable::global().release(path, false)
}

/// Release one level of a prior acquisition of `path` with explicit
/// options (only `keep_empty` applies to release).
pub fn unlock_with<P: AsRef<Path>>(path: P, options: &LockOptions) -> Result<()> {
    LockTable::global().release(path, options.keep_empty)
}

/// Acquire an RAII guard on a single path, blocking until granted.
pub fn lock_guard<P: AsRef<Path>>(path: P) -> Result<LockGuard<'static>> {
    LockGuard::acquire_with(LockTable::global(), [path], &LockOptions::default())
}

/// Acquire an RAII guard over an ordered sequence of paths.
///
/// Paths are locked in iteration order and released in reverse order. If a
/// later acquisition fails, the earlier ones are released before the error
/// is returned.
pub fn lock_guard_all<I, P>(paths: I) -> Result<LockGuard<'static>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    LockGuard::acquire_with(LockTable::global(), paths, &LockOptions::default())
}

/// Attempt to acquire an RAII guard on a single path without blocking.
///
/// # Returns
///
/// * `Ok(Some(guard))` - The lock is now held
/// * `Ok(None)` - Another process holds the lock
/// * `Err(_)` - Path validation or a syscall failed
pub fn try_lock_guard<P: AsRef<Path>>(path: P) -> Result<Option<LockGuard<'static>>> {
    let options = LockOptions::new().with_non_blocking(true);
    match LockGuard::acquire_with(LockTable::global(), [path], &options) {
        Ok(guard) => Ok(Some(guard)),
        Err(FileMutexError::WouldBlock(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
