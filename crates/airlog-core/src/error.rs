//! Error types for airlog-core.

use thiserror::Error;

use crate::traits::Channel;

/// Errors raised by a transport or a sync session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport does not (yet) expose the requested channel.
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(Channel),

    /// The transport reported a failure on a read or write.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The sync session has shut down and no longer accepts commands.
    #[error("Sync session closed")]
    SessionClosed,
}

impl Error {
    /// Create a transport error from any message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Result type alias using airlog-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
