use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using `anyhow::Error`
pub type Result<T> = anyhow::Result<T>;

/// Fatal engine-level failures.
///
/// Per-item problems (a file that cannot be hashed or written) are never
/// reported through this type; they are collected as values so the rest of
/// the run can proceed.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Two items in one plan point at the same target path.
    #[error("duplicate target path in plan: {}", .0.display())]
    DuplicateTarget(PathBuf),

    /// A live lock was held by another invocation for longer than we waited.
    #[error("timed out after {waited:?} waiting for lock '{name}' at {}", path.display())]
    LockTimeout {
        /// Lock name
        name: String,
        /// Lock marker path
        path: PathBuf,
        /// Time spent waiting
        waited: Duration,
    },

    /// The lock marker could not be created or inspected.
    #[error("failed to access lock marker {}: {source}", path.display())]
    LockIo {
        /// Lock marker path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The baseline store exists but could not be parsed.
    #[error("baseline store {} is invalid: {reason}", path.display())]
    InvalidBaseline {
        /// Store path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Conflicts remain unresolved in a mode that requires resolution.
    #[error("{0} conflict(s) left unresolved; rerun interactively or resolve them manually")]
    UnresolvedConflicts(usize),
}
