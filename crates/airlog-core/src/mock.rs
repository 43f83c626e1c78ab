//! Mock transport implementation for testing.
//!
//! This module provides a scripted sensor that can be used for unit testing
//! and simulation without real radio hardware.
//!
//! The [`MockTransport`] implements the [`Transport`] trait, allowing it to be
//! used interchangeably with a real link in generic code. Writing a backfill
//! command makes it stream the configured history back as chunk
//! notifications, the way a device does.
//!
//! # Features
//!
//! - **Scripted values**: current reading and metadata channels
//! - **History playback**: 7- or 8-byte entries, configurable chunk size
//! - **Failure injection**: missing channels, failing writes, truncated playback

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use airlog_types::decode::EntryStride;
use airlog_types::protocol::HISTORY_REQUEST;
use airlog_types::MeasurementRecord;

use crate::error::{Error, Result};
use crate::traits::{Channel, Notification, Transport};

/// Capacity of the notification channel handed to the session.
pub const NOTIFICATION_BUFFER: usize = 64;

/// Default number of entries per history chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Pack one record into a history entry.
///
/// Inverse of the history decoder's field scaling; values are rounded to the
/// nearest raw unit.
#[must_use]
pub fn encode_history_entry(record: &MeasurementRecord, stride: EntryStride) -> Bytes {
    let mut buf = BytesMut::with_capacity(stride.width());
    buf.put_u16_le(record.co2);
    buf.put_i16_le((record.temperature * 20.0).round() as i16);
    buf.put_u16_le((record.pressure * 10.0).round() as u16);
    match stride {
        EntryStride::Seven => buf.put_u8(record.humidity.round() as u8),
        EntryStride::Eight => buf.put_u16_le((record.humidity * 100.0).round() as u16),
    }
    buf.freeze()
}

/// Pack a record into a 13-byte current reading frame.
#[must_use]
pub fn encode_current_reading(record: &MeasurementRecord, interval: u16, age: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(13);
    buf.put_u16_le(record.co2);
    buf.put_i16_le((record.temperature * 20.0).round() as i16);
    buf.put_u16_le((record.pressure * 10.0).round() as u16);
    buf.put_u8(record.humidity.round() as u8);
    // battery, status
    buf.put_u8(100);
    buf.put_u8(1);
    buf.put_u16_le(interval);
    buf.put_u16_le(age);
    buf.freeze()
}

/// Builder for [`MockTransport`].
#[derive(Debug, Clone)]
pub struct MockTransportBuilder {
    values: HashMap<Channel, Bytes>,
    missing: HashSet<Channel>,
    history: Vec<MeasurementRecord>,
    stride: EntryStride,
    chunk_size: usize,
    stop_after_chunks: Option<usize>,
    fail_writes: bool,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            missing: HashSet::new(),
            history: Vec::new(),
            stride: EntryStride::Seven,
            chunk_size: DEFAULT_CHUNK_SIZE,
            stop_after_chunks: None,
            fail_writes: false,
        }
    }
}

impl MockTransportBuilder {
    /// Raw bytes returned by a channel read.
    #[must_use]
    pub fn value(mut self, channel: Channel, data: impl Into<Bytes>) -> Self {
        self.values.insert(channel, data.into());
        self
    }

    /// Raw current reading frame.
    #[must_use]
    pub fn current_reading(self, data: &[u8]) -> Self {
        self.value(Channel::CurrentReading, Bytes::copy_from_slice(data))
    }

    /// Metadata values, each served as a little-endian `u16`.
    #[must_use]
    pub fn metadata(self, total: u16, interval: u16, age: u16) -> Self {
        self.value(Channel::TotalReadings, Bytes::copy_from_slice(&total.to_le_bytes()))
            .value(Channel::Interval, Bytes::copy_from_slice(&interval.to_le_bytes()))
            .value(
                Channel::SecondsSinceUpdate,
                Bytes::copy_from_slice(&age.to_le_bytes()),
            )
    }

    /// Records played back after a backfill command, oldest first.
    ///
    /// Only the field values matter; timestamps are reassigned by the reader.
    #[must_use]
    pub fn history(mut self, records: &[MeasurementRecord]) -> Self {
        self.history = records.to_vec();
        self
    }

    /// Play back 8-byte entries (humidity in hundredths).
    #[must_use]
    pub fn eight_byte_entries(mut self) -> Self {
        self.stride = EntryStride::Eight;
        self
    }

    /// Entries per chunk.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Stop the playback after this many chunks.
    #[must_use]
    pub fn stop_after_chunks(mut self, chunks: usize) -> Self {
        self.stop_after_chunks = Some(chunks);
        self
    }

    /// Hide a channel, as if discovery had not found it.
    #[must_use]
    pub fn without_channel(mut self, channel: Channel) -> Self {
        self.missing.insert(channel);
        self
    }

    /// Make every write fail.
    #[must_use]
    pub fn fail_writes(mut self, fail: bool) -> Self {
        self.fail_writes = fail;
        self
    }

    /// Build the transport and the receiver its notifications arrive on.
    #[must_use]
    pub fn build(self) -> (MockTransport, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let transport = MockTransport {
            values: self.values,
            missing: self.missing,
            history: self.history,
            stride: self.stride,
            chunk_size: self.chunk_size,
            stop_after_chunks: self.stop_after_chunks,
            fail_writes: AtomicBool::new(self.fail_writes),
            read_count: AtomicU32::new(0),
            writes: Mutex::new(Vec::new()),
            notifications: tx,
        };
        (transport, rx)
    }
}

/// A scripted sensor link for testing.
///
/// Implements [`Transport`] for use in generic code and testing.
pub struct MockTransport {
    values: HashMap<Channel, Bytes>,
    missing: HashSet<Channel>,
    history: Vec<MeasurementRecord>,
    stride: EntryStride,
    chunk_size: usize,
    stop_after_chunks: Option<usize>,
    fail_writes: AtomicBool,
    read_count: AtomicU32,
    writes: Mutex<Vec<(Channel, Bytes)>>,
    notifications: mpsc::Sender<Notification>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("missing", &self.missing)
            .field("history", &self.history.len())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl MockTransport {
    /// Start configuring a mock.
    #[must_use]
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Push a notification as if the device had sent it.
    pub async fn notify(&self, channel: Channel, data: &[u8]) {
        let notification = Notification::new(channel, Bytes::copy_from_slice(data));
        if self.notifications.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
        }
    }

    /// Toggle write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of successful reads so far.
    #[must_use]
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Every write received, in order.
    pub async fn writes(&self) -> Vec<(Channel, Bytes)> {
        self.writes.lock().await.clone()
    }

    /// Chunks a request starting at `start_index` (1-based) produces.
    fn chunks_for(&self, metric: u8, start_index: u16) -> Vec<Bytes> {
        let skip = usize::from(start_index.saturating_sub(1));
        let limit = self.stop_after_chunks.unwrap_or(usize::MAX);

        self.history
            .iter()
            .enumerate()
            .skip(skip)
            .collect::<Vec<_>>()
            .chunks(self.chunk_size)
            .take(limit)
            .map(|entries| {
                let first = entries.first().map(|(i, _)| *i + 1).unwrap_or(1);
                let mut buf = BytesMut::new();
                buf.put_u8(metric);
                buf.put_u16_le(u16::try_from(first).unwrap_or(u16::MAX));
                buf.put_u8(u8::try_from(entries.len()).unwrap_or(u8::MAX));
                for (_, record) in entries {
                    buf.put(encode_history_entry(record, self.stride));
                }
                buf.freeze()
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn has_channel(&self, channel: Channel) -> bool {
        !self.missing.contains(&channel)
    }

    async fn read(&self, channel: Channel) -> Result<Bytes> {
        if !self.has_channel(channel) {
            return Err(Error::ChannelUnavailable(channel));
        }
        self.read_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.values.get(&channel).cloned().unwrap_or_default())
    }

    async fn write(&self, channel: Channel, data: &[u8]) -> Result<()> {
        if !self.has_channel(channel) {
            return Err(Error::ChannelUnavailable(channel));
        }
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::transport("mock write failure"));
        }
        self.writes
            .lock()
            .await
            .push((channel, Bytes::copy_from_slice(data)));

        if let (Channel::Command, [HISTORY_REQUEST, metric, lo, hi, ..]) = (channel, data) {
            let chunks = self.chunks_for(*metric, u16::from_le_bytes([*lo, *hi]));
            debug!(chunks = chunks.len(), "Mock streaming history");
            let tx = self.notifications.clone();
            tokio::spawn(async move {
                for chunk in chunks {
                    if tx
                        .send(Notification::new(Channel::HistoryChunk, chunk))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
        Ok(())
    }
}
