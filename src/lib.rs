//! Advisory file locks usable as inter-process mutexes.
//!
//! A filesystem path names a lock; `flock` provides the exclusion; a
//! process-local table keyed by device+inode makes acquisition reentrant
//! within one process. Lockfiles are created on first lock and, by default,
//! reclaimed again if they are still empty when the last hold is released,
//! so paths used purely as mutexes leave nothing behind.
//!
//! The lock serializes distinct *processes* only: threads of a process that
//! already holds a lock acquire it again immediately. Locks are advisory,
//! so they only constrain processes that also go through this API (or the
//! same `flock` discipline).
//!
//! # Usage
//!
//! ```no_run
//! fn main() -> filemutex::Result<()> {
//!     // RAII: released (and the empty lockfile reclaimed) at end of scope.
//!     let _guard = filemutex::lock_guard("a.lock")?;
//!
//!     // Or bracket a single operation:
//!     filemutex::io::write("data.txt", "payload")?;
//!     let contents = filemutex::io::read("data.txt")?;
//!     assert_eq!(contents, "payload");
//!     Ok(())
//! }
//! ```
//!
//! # Hazards
//!
//! Do not fork while holding a lock: the child inherits the locked
//! descriptor but not the bookkeeping, and cannot release it through this
//! API. Crashed holders are cleaned up by the kernel closing their
//! descriptors.

#[cfg(not(unix))]
compile_error!("filemutex relies on flock and inode identity and only supports Unix targets");

pub mod error;
pub mod identity;
pub mod io;
pub mod mutex;

pub use error::{FileMutexError, Result};
pub use identity::{Identity, identity_of, still_refers};
pub use mutex::{
    LockGuard, LockOptions, LockTable, lock, lock_guard, lock_guard_all, try_lock,
    try_lock_guard, unlock, unlock_with,
};
