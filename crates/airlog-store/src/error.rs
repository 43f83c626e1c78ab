//! Error types for airlog-store.

use std::path::PathBuf;

use time::OffsetDateTime;

/// Result type for airlog-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in airlog-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Timestamp outside what the canonical format can write.
    #[error("Failed to format timestamp: {0}")]
    Format(#[from] time::error::Format),

    /// Failed to move the temporary file over the destination.
    #[error("Failed to replace file: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// Failed to create the store directory.
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Range whose start lies after its end.
    #[error("Invalid range: {start} is after {end}")]
    InvalidRange {
        start: OffsetDateTime,
        end: OffsetDateTime,
    },
}
