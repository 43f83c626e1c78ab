//! Error types for data parsing in airlog-types.

use thiserror::Error;

/// Errors that can occur when interpreting raw sensor payloads.
///
/// The record decoders themselves report malformed frames as "no record"
/// rather than as errors; this type is used by the stricter helpers such as
/// [`HistoryChunk::try_parse`](crate::protocol::HistoryChunk::try_parse).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The buffer is shorter than the fixed layout requires.
    #[error("Insufficient bytes: expected at least {expected}, got {actual}")]
    InsufficientBytes {
        /// Minimum number of bytes required.
        expected: usize,
        /// Number of bytes actually supplied.
        actual: usize,
    },

    /// The buffer has a structure the decoder does not recognise.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using airlog-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
