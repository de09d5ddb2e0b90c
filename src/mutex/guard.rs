//! RAII lock guard over one or more paths.

use super::options::LockOptions;
use super::table::LockTable;
use crate::error::Result;
use crate::identity::Identity;
use std::path::{Path, PathBuf};

/// RAII guard holding exclusive locks on an ordered set of paths.
///
/// Construction acquires every path in the given order; if a later
/// acquisition fails, the already-acquired paths are released in reverse
/// order before the error is returned, so a guard is never left
/// half-acquired. Dropping the guard releases all held paths in reverse
/// acquisition order. If a release fails during drop, a warning is printed
/// but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'t> {
    table: &'t LockTable,
    /// Held identities in acquisition order, with the path each was
    /// acquired under (for messages).
    held: Vec<(Identity, PathBuf)>,
    keep_empty: bool,
}

impl<'t> LockGuard<'t> {
    /// Acquire locks on `paths` (in order) against an explicit table.
    ///
    /// # Arguments
    ///
    /// * `table` - The lock table to register the holds in
    /// * `paths` - Lock targets, acquired in iteration order
    /// * `options` - Non-blocking and keep-empty behavior
    ///
    /// # Returns
    ///
    /// * `Ok(LockGuard)` - All paths acquired
    /// * `Err(_)` - Some acquisition failed; nothing is left held
    pub fn acquire_with<I, P>(table: &'t LockTable, paths: I, options: &LockOptions) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut held: Vec<(Identity, PathBuf)> = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match table.acquire(path, options.non_blocking) {
                Ok(identity) => held.push((identity, path.to_path_buf())),
                Err(e) => {
                    // Roll back so a failed multi-lock never leaves a
                    // partial hold.
                    for (identity, held_path) in held.iter().rev() {
                        if let Err(release_err) =
                            table.release_identity(*identity, options.keep_empty)
                        {
                            eprintln!(
                                "Warning: failed to release lock '{}' during rollback: {}",
                                held_path.display(),
                                release_err
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(Self {
            table,
            held,
            keep_empty: options.keep_empty,
        })
    }

    /// The held paths, in acquisition order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.held.iter().map(|(_, path)| path.as_path())
    }

    /// The held identities, in acquisition order.
    pub fn identities(&self) -> impl Iterator<Item = Identity> + '_ {
        self.held.iter().map(|(identity, _)| *identity)
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        for (identity, path) in self.held.iter().rev() {
            if let Err(e) = self.table.release_identity(*identity, self.keep_empty) {
                eprintln!(
                    "Warning: failed to release lock '{}': {}",
                    path.display(),
                    e
                );
            }
        }
    }
}
