//! The process-wide lock table.
//!
//! The table is the single source of truth for what the current process
//! holds: a map from file identity to the open, locked descriptor and its
//! reentrant reference count, guarded by an internal mutex. One global
//! instance backs the free-function API; the type is public so callers who
//! want an explicitly owned table (e.g. to guarantee release-all on drop)
//! can construct their own. Running two tables in one process is not
//! supported: they would contend against each other at the flock level.

use crate::identity::Identity;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{LazyLock, Mutex, MutexGuard};

/// Bookkeeping for one held lock.
#[derive(Debug)]
pub(crate) struct LockEntry {
    /// Open descriptor holding the OS exclusive advisory lock.
    pub(crate) file: File,

    /// Outstanding acquisitions not yet matched by a release. Always >= 1
    /// while the entry exists.
    pub(crate) count: u32,

    /// Process id that created the entry. A mismatch means the entry was
    /// inherited across a fork and must not be treated as held.
    pub(crate) owner_pid: u32,

    /// Path the lock was acquired under, retained so release can reclaim an
    /// empty lockfile without re-deriving the path from the descriptor.
    pub(crate) path: PathBuf,
}

/// Process-local table of held locks, keyed by file identity.
#[derive(Debug, Default)]
pub struct LockTable {
    entries: Mutex<BTreeMap<Identity, LockEntry>>,
}

static GLOBAL_TABLE: LazyLock<LockTable> = LazyLock::new(LockTable::new);

impl LockTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// The process-wide table backing the free-function API.
    ///
    /// The global table is never dropped; locks it still holds at process
    /// exit are released by the kernel closing their descriptors.
    pub fn global() -> &'static Self {
        &GLOBAL_TABLE
    }

    /// Lock the entry map, recovering from a poisoned mutex.
    ///
    /// A panic in another thread mid-update can at worst leave a count off
    /// by one; the map structure itself is updated in single operations.
    pub(crate) fn entries(&self) -> MutexGuard<'_, BTreeMap<Identity, LockEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Number of outstanding acquisitions of `identity` by this process.
    ///
    /// Zero means the identity is not held.
    pub fn reference_count(&self, identity: Identity) -> u32 {
        self.entries().get(&identity).map_or(0, |entry| entry.count)
    }
}

impl Drop for LockTable {
    fn drop(&mut self) {
        // Best-effort release of everything still held. Files stay on disk:
        // a teardown path is the wrong place to decide a lockfile is garbage.
        let entries = std::mem::take(
            self.entries
                .get_mut()
                .unwrap_or_else(|poison| poison.into_inner()),
        );
        for (identity, entry) in entries {
            let path = entry.path.clone();
            if let Err(e) = super::release::teardown_entry(entry, identity, true) {
                tracing::warn!(path = %path.display(), error = %e, "failed to release lock at table teardown");
            }
        }
    }
}
