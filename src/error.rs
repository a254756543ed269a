//! Error types for the cache
//!
//! Provides unified error handling using thiserror. A missing or expired key is
//! not an error: lookups return `Option` and callers treat absence as expected.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Failures surfaced by snapshot save and load.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Snapshot could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No snapshot exists under the requested name
    #[error("No snapshot found at {path}")]
    SnapshotNotFound { path: PathBuf },

    /// Snapshot bytes are not a valid snapshot document
    #[error("Corrupt snapshot: {0}")]
    Decode(#[source] serde_json::Error),

    /// Snapshot was written with a format this build does not understand
    #[error("Unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    /// Snapshot name would resolve outside the snapshot directory
    #[error("Invalid snapshot name: {name:?}")]
    InvalidName { name: String },

    /// Entries could not be serialized
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CacheError {
    // == Constructors ==
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true when the failure means "no snapshot yet", which callers
    /// usually answer by starting from an empty cache.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::SnapshotNotFound { .. })
    }

    /// Returns true for failures caused by unreadable snapshot contents.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            CacheError::Decode(_) | CacheError::UnsupportedFormat { .. }
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
