//! Error types for filemutex.
//!
//! Uses thiserror for derive macros and keeps messages descriptive: every
//! variant names the offending path so callers can report failures directly.

use thiserror::Error;

/// Main error type for filemutex operations.
///
/// Each variant corresponds to one failure class of the locking protocol or
/// of the I/O helpers built on top of it.
#[derive(Error, Debug)]
pub enum FileMutexError {
    /// The path is empty or ends in a path separator.
    #[error("invalid lock path: {0}")]
    InvalidPath(String),

    /// The path exists but does not refer to a regular file.
    #[error("invalid lock target: {0}")]
    InvalidTarget(String),

    /// The file or its containing directory is not accessible to the caller.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A path expected to exist could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A non-blocking acquisition found the lock held by another process.
    #[error("lock is held by another process: {0}")]
    WouldBlock(String),

    /// An open/stat/fsync/unlink syscall failed.
    #[error("{0}")]
    Os(String),

    /// The lock could not be cleanly released.
    #[error("failed to release lock: {0}")]
    Unlock(String),
}

/// Result type alias for filemutex operations.
pub type Result<T> = std::result::Result<T, FileMutexError>;
