//! Trait abstractions over the sensor transport.
//!
//! This module provides the [`Transport`] trait that abstracts over a real
//! radio link and the [`MockTransport`](crate::mock::MockTransport) used in
//! tests. Connection lifecycle is the transport's business; the core only
//! reads channels, writes commands and consumes notifications.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use airlog_types::uuids;

use crate::error::Result;

/// A logical data path exposed by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Latest sample, optionally with interval and age.
    CurrentReading,
    /// Number of readings held in the on-board ring buffer.
    TotalReadings,
    /// Sampling interval (seconds, or minutes on old firmware).
    Interval,
    /// Age of the most recent reading in seconds.
    SecondsSinceUpdate,
    /// Streamed history chunks.
    HistoryChunk,
    /// Command sink.
    Command,
}

impl Channel {
    /// GATT characteristic backing this channel.
    #[must_use]
    pub fn uuid(self) -> Uuid {
        match self {
            Self::CurrentReading => uuids::CURRENT_READINGS,
            Self::TotalReadings => uuids::TOTAL_READINGS,
            Self::Interval => uuids::READ_INTERVAL,
            Self::SecondsSinceUpdate => uuids::SECONDS_SINCE_UPDATE,
            Self::HistoryChunk => uuids::HISTORY,
            Self::Command => uuids::COMMAND,
        }
    }

    /// Reverse lookup from a characteristic UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        [
            Self::CurrentReading,
            Self::TotalReadings,
            Self::Interval,
            Self::SecondsSinceUpdate,
            Self::HistoryChunk,
            Self::Command,
        ]
        .into_iter()
        .find(|c| c.uuid() == uuid)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CurrentReading => "current reading",
            Self::TotalReadings => "total readings",
            Self::Interval => "interval",
            Self::SecondsSinceUpdate => "seconds since update",
            Self::HistoryChunk => "history chunk",
            Self::Command => "command",
        };
        f.write_str(name)
    }
}

/// A buffer pushed by the transport without being asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the buffer arrived on.
    pub channel: Channel,
    /// Raw payload.
    pub data: Bytes,
}

impl Notification {
    /// Build a notification.
    pub fn new(channel: Channel, data: impl Into<Bytes>) -> Self {
        Self {
            channel,
            data: data.into(),
        }
    }
}

/// Whether the channels a backfill needs are exposed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelAvailability {
    /// The history chunk channel can deliver notifications.
    pub history: bool,
    /// The command channel accepts writes.
    pub command: bool,
}

impl ChannelAvailability {
    /// Both backfill channels present.
    pub const READY: Self = Self {
        history: true,
        command: true,
    };

    /// Query a transport.
    pub fn detect<T: Transport + ?Sized>(transport: &T) -> Self {
        Self {
            history: transport.has_channel(Channel::HistoryChunk),
            command: transport.has_channel(Channel::Command),
        }
    }

    /// True when a backfill can be requested.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.history && self.command
    }
}

/// Trait abstracting the link to one sensor.
///
/// Implementations must be cheap to share across tasks; the session holds
/// one for its whole lifetime.
///
/// # Example
///
/// ```ignore
/// use airlog_core::{Channel, Transport, Result};
///
/// async fn read_total<T: Transport>(transport: &T) -> Result<usize> {
///     let bytes = transport.read(Channel::TotalReadings).await?;
///     Ok(bytes.len())
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the channel has been discovered on the current link.
    fn has_channel(&self, channel: Channel) -> bool;

    /// Read the current value of a channel.
    async fn read(&self, channel: Channel) -> Result<Bytes>;

    /// Write an opaque buffer to a channel.
    async fn write(&self, channel: Channel, data: &[u8]) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn has_channel(&self, channel: Channel) -> bool {
        (**self).has_channel(channel)
    }

    async fn read(&self, channel: Channel) -> Result<Bytes> {
        (**self).read(channel).await
    }

    async fn write(&self, channel: Channel, data: &[u8]) -> Result<()> {
        (**self).write(channel, data).await
    }
}
