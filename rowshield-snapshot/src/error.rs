//! Error types for snapshot persistence.

use thiserror::Error;

/// Result type alias for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur saving, loading, or comparing snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file is not valid JSON of the expected shape.
    #[error("invalid snapshot file: {0}")]
    Invalid(String),

    /// The snapshot was written by an incompatible version.
    #[error("unsupported snapshot version {found} (this build reads version {supported})")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build writes and reads.
        supported: u32,
    },
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Invalid(err.to_string())
    }
}
