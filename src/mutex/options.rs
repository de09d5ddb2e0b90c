//! Configuration for lock acquisition and release behavior.

/// Options controlling how locks are acquired and released.
///
/// Defaults mirror the plain API: block until the lock is granted, and
/// reclaim a lockfile that is still empty when the last hold is released.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockOptions {
    /// Fail with `WouldBlock` instead of waiting when the lock is held by
    /// another process.
    pub non_blocking: bool,

    /// Leave an empty lockfile on disk at final release instead of
    /// unlinking it.
    pub keep_empty: bool,
}

impl LockOptions {
    /// Create options with default behavior.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether acquisition fails immediately on contention.
    #[must_use]
    pub fn with_non_blocking(mut self, non_blocking: bool) -> Self {
        self.non_blocking = non_blocking;
        self
    }

    /// Set whether empty lockfiles are kept at final release.
    #[must_use]
    pub fn with_keep_empty(mut self, keep_empty: bool) -> Self {
        self.keep_empty = keep_empty;
        self
    }
}
