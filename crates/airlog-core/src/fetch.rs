//! History backfill coordination.
//!
//! The sensor keeps a ring buffer of past samples without timestamps. To
//! rebuild the series the coordinator first needs three metadata values
//! (stored count, sampling interval, age of the newest sample), then issues a
//! single backfill command and assigns absolute timestamps to the entries of
//! every chunk the device streams back.
//!
//! [`HistoryFetchCoordinator`] is a pure state machine: each
//! [`FetchEvent`] goes through [`HistoryFetchCoordinator::handle`] together
//! with the current time and produces a [`Transition`] listing the records to
//! store, the command to send and the reason a fetch did or did not start. It
//! performs no I/O; the [`SyncSession`](crate::session::SyncSession) owns it
//! and applies its transitions.
//!
//! ```text
//! Idle -> AccumulatingMetadata -> Requesting -> ReceivingChunks -> Idle
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use airlog_types::decode::decode_history_chunk;
use airlog_types::protocol::{BackfillCommand, HistoryChunk, METRIC_ALL};
use airlog_types::MeasurementRecord;

use crate::traits::{Channel, ChannelAvailability};

/// Interval values up to this many are minutes from old firmware.
pub const MAX_MINUTE_INTERVAL: u32 = 30;

/// Convert a raw interval to seconds.
///
/// Values in `1..=30` are minutes; anything else is already seconds.
///
/// ```
/// use airlog_core::fetch::normalize_interval;
///
/// assert_eq!(normalize_interval(5), 300);
/// assert_eq!(normalize_interval(300), 300);
/// assert_eq!(normalize_interval(0), 0);
/// ```
#[must_use]
pub fn normalize_interval(raw: u32) -> u32 {
    if (1..=MAX_MINUTE_INTERVAL).contains(&raw) {
        raw * 60
    } else {
        raw
    }
}

/// One of the three values needed before a backfill can be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataKind {
    /// Number of readings stored on the device.
    TotalReadings,
    /// Sampling interval.
    Interval,
    /// Seconds since the newest reading was taken.
    LastReadingAge,
}

impl MetadataKind {
    /// All kinds, in the order the session reads them.
    pub const ALL: [Self; 3] = [Self::TotalReadings, Self::Interval, Self::LastReadingAge];

    /// Channel that delivers this value.
    #[must_use]
    pub fn channel(self) -> Channel {
        match self {
            Self::TotalReadings => Channel::TotalReadings,
            Self::Interval => Channel::Interval,
            Self::LastReadingAge => Channel::SecondsSinceUpdate,
        }
    }

    /// Kind carried by a channel, if it is a metadata channel.
    #[must_use]
    pub fn from_channel(channel: Channel) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.channel() == channel)
    }
}

/// Tunables for the coordinator and its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Metric selector placed in the backfill command.
    pub metric: u8,
    /// Give up when no chunk arrives for this long.
    pub chunk_timeout: Duration,
    /// Period of the session's timeout tick.
    pub tick_interval: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            metric: METRIC_ALL,
            chunk_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl FetchConfig {
    /// Set the metric selector.
    #[must_use]
    pub fn metric(mut self, metric: u8) -> Self {
        self.metric = metric;
        self
    }

    /// Set the chunk wait timeout.
    #[must_use]
    pub fn chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Set the tick period.
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// Per-session fetch bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFetchState {
    /// Stored reading count reported by the device.
    pub total_readings: Option<u32>,
    /// Sampling interval in seconds (already normalized).
    pub interval_seconds: Option<u32>,
    /// Age of the newest reading in seconds.
    pub last_reading_age_seconds: Option<u32>,
    /// Exclusion token: set while a backfill is in flight.
    pub is_fetching: bool,
    /// Records still expected; the fetch completes at zero or below.
    pub remaining_records: i64,
}

impl DeviceFetchState {
    /// Metadata kinds not yet reported.
    #[must_use]
    pub fn missing(&self) -> Vec<MetadataKind> {
        let mut missing = Vec::new();
        if self.total_readings.is_none() {
            missing.push(MetadataKind::TotalReadings);
        }
        if self.interval_seconds.is_none() {
            missing.push(MetadataKind::Interval);
        }
        if self.last_reading_age_seconds.is_none() {
            missing.push(MetadataKind::LastReadingAge);
        }
        missing
    }

    fn clear_metadata(&mut self) {
        self.total_readings = None;
        self.interval_seconds = None;
        self.last_reading_age_seconds = None;
    }
}

/// Where the coordinator is in a backfill sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchPhase {
    /// Nothing known, nothing in flight.
    #[default]
    Idle,
    /// Some metadata known, not enough to start.
    AccumulatingMetadata,
    /// Command issued, no chunk received yet.
    Requesting,
    /// At least one chunk received, more expected.
    ReceivingChunks,
}

/// Identifies one backfill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken(pub u64);

/// The backfill currently in flight, used to correlate incoming chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Token for this request.
    pub token: RequestToken,
    /// Metric selector sent; chunks echoing another selector are stray.
    pub metric: u8,
    /// Records announced by the device.
    pub expected: u32,
    /// Timestamp of the oldest stored record.
    pub first_timestamp: OffsetDateTime,
    /// Spacing between records in seconds.
    pub interval_seconds: u32,
    /// When the command was issued.
    pub issued_at: OffsetDateTime,
    /// Last time the request made progress.
    pub last_activity: OffsetDateTime,
    /// Records decoded so far.
    pub received: u32,
}

impl PendingRequest {
    /// Timestamp of the first entry in a chunk starting at `start_index` (1-based).
    #[must_use]
    pub fn chunk_start(&self, start_index: u16) -> OffsetDateTime {
        let offset = i64::from(start_index.saturating_sub(1)) * i64::from(self.interval_seconds);
        self.first_timestamp + time::Duration::seconds(offset)
    }
}

/// Input to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// A metadata channel delivered a raw value.
    MetadataArrived(MetadataKind, u32),
    /// The history channel delivered a chunk.
    ChunkArrived(HistoryChunk),
    /// The transport discovered or lost channels.
    ChannelsChanged(ChannelAvailability),
    /// Periodic clock tick.
    Tick,
}

/// Result of evaluating whether a backfill can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartDecision {
    /// A command was issued.
    Started,
    /// A backfill is already in flight.
    AlreadyFetching,
    /// Not all three metadata values are known.
    MissingMetadata,
    /// The history or command channel is not exposed.
    ChannelsUnavailable,
    /// The device reports no stored readings.
    NothingStored,
}

/// How a backfill ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOutcome {
    /// Every announced record arrived.
    Complete {
        /// Records decoded.
        received: u32,
    },
    /// No chunk arrived within the timeout.
    Incomplete {
        /// Records decoded.
        received: u32,
        /// Records announced.
        expected: u32,
    },
    /// Aborted by the caller.
    Cancelled {
        /// Records decoded.
        received: u32,
        /// Records announced.
        expected: u32,
    },
}

/// Everything an event produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// Records to hand to the store.
    pub records: Vec<MeasurementRecord>,
    /// Command to write to the command channel.
    pub command: Option<BackfillCommand>,
    /// Start evaluation result, when the event triggered one.
    pub decision: Option<StartDecision>,
    /// Set when a backfill finished with this event.
    pub outcome: Option<FetchOutcome>,
}

impl Transition {
    fn decided(decision: StartDecision, command: Option<BackfillCommand>) -> Self {
        Self {
            decision: Some(decision),
            command,
            ..Self::default()
        }
    }

    fn finished(outcome: FetchOutcome) -> Self {
        Self {
            outcome: Some(outcome),
            ..Self::default()
        }
    }
}

/// State machine sequencing metadata discovery and chunked backfill.
#[derive(Debug, Clone)]
pub struct HistoryFetchCoordinator {
    config: FetchConfig,
    state: DeviceFetchState,
    channels: ChannelAvailability,
    phase: FetchPhase,
    pending: Option<PendingRequest>,
    next_token: u64,
}

impl HistoryFetchCoordinator {
    /// Create an idle coordinator. Channels start out unavailable.
    #[must_use]
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            state: DeviceFetchState::default(),
            channels: ChannelAvailability::default(),
            phase: FetchPhase::Idle,
            pending: None,
            next_token: 1,
        }
    }

    /// Create a coordinator with known channel availability.
    #[must_use]
    pub fn with_channels(config: FetchConfig, channels: ChannelAvailability) -> Self {
        Self {
            channels,
            ..Self::new(config)
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    /// Current bookkeeping.
    #[must_use]
    pub fn state(&self) -> &DeviceFetchState {
        &self.state
    }

    /// The in-flight request, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Apply one event.
    pub fn handle(&mut self, event: FetchEvent, now: OffsetDateTime) -> Transition {
        match event {
            FetchEvent::MetadataArrived(kind, value) => {
                self.record_metadata(kind, value);
                self.evaluate(now)
            }
            FetchEvent::ChannelsChanged(channels) => {
                self.channels = channels;
                self.evaluate(now)
            }
            FetchEvent::ChunkArrived(chunk) => self.accept_chunk(chunk, now),
            FetchEvent::Tick => self.check_timeout(now),
        }
    }

    /// Decide whether to start a backfill, starting it when possible.
    ///
    /// The exclusion token is checked and set in the same call, so two
    /// evaluations in a row yield at most one command.
    pub fn evaluate(&mut self, now: OffsetDateTime) -> Transition {
        if self.state.is_fetching {
            return Transition::decided(StartDecision::AlreadyFetching, None);
        }

        let (Some(total), Some(interval), Some(age)) = (
            self.state.total_readings,
            self.state.interval_seconds,
            self.state.last_reading_age_seconds,
        ) else {
            debug!(missing = ?self.state.missing(), "Backfill not started: metadata incomplete");
            return Transition::decided(StartDecision::MissingMetadata, None);
        };

        if !self.channels.is_ready() {
            debug!(channels = ?self.channels, "Backfill not started: channels unavailable");
            return Transition::decided(StartDecision::ChannelsUnavailable, None);
        }

        if total == 0 {
            debug!("Backfill not started: device has no stored readings");
            return Transition::decided(StartDecision::NothingStored, None);
        }

        let last = now - time::Duration::seconds(i64::from(age));
        let span = i64::from(total - 1) * i64::from(interval);
        let first = last - time::Duration::seconds(span);

        let token = RequestToken(self.next_token);
        self.next_token += 1;

        self.state.is_fetching = true;
        self.state.remaining_records = i64::from(total);
        self.phase = FetchPhase::Requesting;
        self.pending = Some(PendingRequest {
            token,
            metric: self.config.metric,
            expected: total,
            first_timestamp: first,
            interval_seconds: interval,
            issued_at: now,
            last_activity: now,
            received: 0,
        });

        info!(
            token = token.0,
            total,
            interval,
            first = %first,
            "Starting history backfill"
        );

        Transition::decided(
            StartDecision::Started,
            Some(BackfillCommand::from_start(self.config.metric)),
        )
    }

    /// Abort the in-flight backfill.
    ///
    /// Returns `None` when nothing was in flight.
    pub fn cancel(&mut self) -> Option<Transition> {
        let pending = self.pending.as_ref()?;
        let outcome = FetchOutcome::Cancelled {
            received: pending.received,
            expected: pending.expected,
        };
        info!(token = pending.token.0, "History backfill cancelled");
        self.finish();
        Some(Transition::finished(outcome))
    }

    fn record_metadata(&mut self, kind: MetadataKind, value: u32) {
        debug!(?kind, value, "Metadata arrived");
        match kind {
            MetadataKind::TotalReadings => self.state.total_readings = Some(value),
            MetadataKind::Interval => self.state.interval_seconds = Some(normalize_interval(value)),
            MetadataKind::LastReadingAge => self.state.last_reading_age_seconds = Some(value),
        }
        if !self.state.is_fetching {
            self.phase = FetchPhase::AccumulatingMetadata;
        }
    }

    fn accept_chunk(&mut self, chunk: HistoryChunk, now: OffsetDateTime) -> Transition {
        let Some(pending) = self.pending.as_mut() else {
            warn!(start = chunk.start_index, "Ignoring history chunk with no request in flight");
            return Transition::default();
        };

        if chunk.metric != pending.metric {
            warn!(
                got = chunk.metric,
                expected = pending.metric,
                "Ignoring history chunk for another metric"
            );
            return Transition::default();
        }

        let start = pending.chunk_start(chunk.start_index);
        let records = decode_history_chunk(&chunk.payload, start, pending.interval_seconds);
        let decoded = u32::try_from(records.len()).unwrap_or(u32::MAX);

        pending.received = pending.received.saturating_add(decoded);
        pending.last_activity = now;
        self.state.remaining_records -= i64::from(decoded);
        self.phase = FetchPhase::ReceivingChunks;

        debug!(
            start = chunk.start_index,
            declared = chunk.declared_count,
            decoded,
            remaining = self.state.remaining_records,
            "History chunk decoded"
        );

        let mut transition = Transition {
            records,
            ..Transition::default()
        };

        if self.state.remaining_records <= 0 {
            let received = pending.received;
            info!(token = pending.token.0, received, "History backfill complete");
            transition.outcome = Some(FetchOutcome::Complete { received });
            self.finish();
        }

        transition
    }

    fn check_timeout(&mut self, now: OffsetDateTime) -> Transition {
        let Some(pending) = self.pending.as_ref() else {
            return Transition::default();
        };

        let idle_ms = (now - pending.last_activity).whole_milliseconds();
        let limit_ms = i128::try_from(self.config.chunk_timeout.as_millis()).unwrap_or(i128::MAX);
        if idle_ms <= limit_ms {
            return Transition::default();
        }

        let outcome = FetchOutcome::Incomplete {
            received: pending.received,
            expected: pending.expected,
        };
        warn!(
            token = pending.token.0,
            received = pending.received,
            expected = pending.expected,
            timeout = ?self.config.chunk_timeout,
            "History backfill timed out"
        );
        self.finish();
        Transition::finished(outcome)
    }

    /// Release the exclusion token. Metadata is dropped so a stale age cannot
    /// trigger the next backfill.
    fn finish(&mut self) {
        self.pending = None;
        self.state.is_fetching = false;
        self.state.remaining_records = 0;
        self.state.clear_metadata();
        self.phase = FetchPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 10:00:00 UTC);

    fn ready() -> HistoryFetchCoordinator {
        HistoryFetchCoordinator::with_channels(FetchConfig::default(), ChannelAvailability::READY)
    }

    fn entry(co2: u16) -> [u8; 7] {
        let [c0, c1] = co2.to_le_bytes();
        // 21.8 °C, 1013.3 hPa, 40 %
        [c0, c1, 0xB4, 0x01, 0x95, 0x27, 0x28]
    }

    fn chunk(metric: u8, start: u16, co2s: &[u16]) -> HistoryChunk {
        let payload: Vec<u8> = co2s.iter().flat_map(|c| entry(*c)).collect();
        HistoryChunk {
            metric,
            start_index: start,
            declared_count: co2s.len() as u8,
            payload: Bytes::from(payload),
        }
    }

    fn feed_metadata(c: &mut HistoryFetchCoordinator, total: u32, interval: u32, age: u32) -> Transition {
        c.handle(FetchEvent::MetadataArrived(MetadataKind::TotalReadings, total), NOW);
        c.handle(FetchEvent::MetadataArrived(MetadataKind::Interval, interval), NOW);
        c.handle(FetchEvent::MetadataArrived(MetadataKind::LastReadingAge, age), NOW)
    }

    #[test]
    fn test_interval_normalization() {
        assert_eq!(normalize_interval(1), 60);
        assert_eq!(normalize_interval(30), 1800);
        assert_eq!(normalize_interval(31), 31);
        assert_eq!(normalize_interval(600), 600);
    }

    #[test]
    fn test_metadata_kind_channels() {
        for kind in MetadataKind::ALL {
            assert_eq!(MetadataKind::from_channel(kind.channel()), Some(kind));
        }
        assert_eq!(MetadataKind::from_channel(Channel::Command), None);
    }

    #[test]
    fn test_starts_once_metadata_complete() {
        let mut c = ready();
        assert_eq!(c.phase(), FetchPhase::Idle);

        let t = c.handle(FetchEvent::MetadataArrived(MetadataKind::Interval, 300), NOW);
        assert_eq!(t.decision, Some(StartDecision::MissingMetadata));
        assert!(t.command.is_none());
        assert_eq!(c.phase(), FetchPhase::AccumulatingMetadata);

        let t = c.handle(FetchEvent::MetadataArrived(MetadataKind::LastReadingAge, 60), NOW);
        assert_eq!(t.decision, Some(StartDecision::MissingMetadata));

        let t = c.handle(FetchEvent::MetadataArrived(MetadataKind::TotalReadings, 3), NOW);
        assert_eq!(t.decision, Some(StartDecision::Started));
        assert_eq!(t.command, Some(BackfillCommand::from_start(METRIC_ALL)));
        assert_eq!(c.phase(), FetchPhase::Requesting);
        assert!(c.state().is_fetching);
        assert_eq!(c.state().remaining_records, 3);
    }

    #[test]
    fn test_fetch_exclusivity() {
        let mut c = ready();
        let mut commands = 0;

        let t = feed_metadata(&mut c, 3, 300, 60);
        commands += usize::from(t.command.is_some());
        let t = c.evaluate(NOW);
        commands += usize::from(t.command.is_some());
        assert_eq!(t.decision, Some(StartDecision::AlreadyFetching));

        // Metadata re-delivered after a reconnect
        let t = c.handle(FetchEvent::MetadataArrived(MetadataKind::TotalReadings, 3), NOW);
        commands += usize::from(t.command.is_some());

        assert_eq!(commands, 1);
    }

    #[test]
    fn test_first_timestamp_computation() {
        let mut c = ready();
        feed_metadata(&mut c, 3, 300, 60);
        let pending = c.pending().unwrap();
        // last = 09:59:00, first = last - 2 * 300s
        assert_eq!(pending.first_timestamp, datetime!(2024-05-01 09:49:00 UTC));
        assert_eq!(pending.chunk_start(3), datetime!(2024-05-01 09:59:00 UTC));
    }

    #[test]
    fn test_minute_interval_applied() {
        let mut c = ready();
        feed_metadata(&mut c, 2, 5, 0);
        let pending = c.pending().unwrap();
        assert_eq!(pending.interval_seconds, 300);
        assert_eq!(pending.first_timestamp, datetime!(2024-05-01 09:55:00 UTC));
    }

    #[test]
    fn test_single_chunk_completes() {
        let mut c = ready();
        feed_metadata(&mut c, 3, 300, 60);

        let t = c.handle(FetchEvent::ChunkArrived(chunk(0, 1, &[400, 500, 600])), NOW);
        assert_eq!(t.records.len(), 3);
        assert_eq!(t.records[0].co2, 400);
        assert_eq!(t.records[0].timestamp, datetime!(2024-05-01 09:49:00 UTC));
        assert_eq!(t.records[2].timestamp, datetime!(2024-05-01 09:59:00 UTC));
        assert_eq!(t.outcome, Some(FetchOutcome::Complete { received: 3 }));

        assert_eq!(c.phase(), FetchPhase::Idle);
        assert!(!c.state().is_fetching);
        assert!(c.pending().is_none());
        assert_eq!(c.state().missing().len(), 3);
    }

    #[test]
    fn test_multiple_chunks_and_out_of_order() {
        let mut c = ready();
        feed_metadata(&mut c, 4, 60, 0);

        let t = c.handle(FetchEvent::ChunkArrived(chunk(0, 3, &[700, 800])), NOW);
        assert_eq!(t.records[0].timestamp, datetime!(2024-05-01 09:59:00 UTC));
        assert!(t.outcome.is_none());
        assert_eq!(c.phase(), FetchPhase::ReceivingChunks);
        assert_eq!(c.state().remaining_records, 2);

        let t = c.handle(FetchEvent::ChunkArrived(chunk(0, 1, &[500, 600])), NOW);
        assert_eq!(t.records[0].timestamp, datetime!(2024-05-01 09:57:00 UTC));
        assert_eq!(t.outcome, Some(FetchOutcome::Complete { received: 4 }));
    }

    #[test]
    fn test_count_uses_decoded_not_declared() {
        let mut c = ready();
        feed_metadata(&mut c, 3, 300, 0);

        let mut lying = chunk(0, 1, &[400]);
        lying.declared_count = 3;
        let t = c.handle(FetchEvent::ChunkArrived(lying), NOW);
        assert_eq!(t.records.len(), 1);
        assert_eq!(c.state().remaining_records, 2);
        assert!(t.outcome.is_none());
    }

    #[test]
    fn test_indeterminate_chunk_decodes_nothing() {
        let mut c = ready();
        feed_metadata(&mut c, 3, 300, 0);

        let odd = HistoryChunk {
            metric: 0,
            start_index: 1,
            declared_count: 1,
            payload: Bytes::from_static(&[1, 2, 3, 4, 5]),
        };
        let t = c.handle(FetchEvent::ChunkArrived(odd), NOW);
        assert!(t.records.is_empty());
        assert_eq!(c.state().remaining_records, 3);
    }

    #[test]
    fn test_stray_chunks_ignored() {
        let mut c = ready();
        let t = c.handle(FetchEvent::ChunkArrived(chunk(0, 1, &[400])), NOW);
        assert!(t.records.is_empty());

        feed_metadata(&mut c, 3, 300, 0);
        let t = c.handle(FetchEvent::ChunkArrived(chunk(4, 1, &[400])), NOW);
        assert!(t.records.is_empty());
        assert_eq!(c.state().remaining_records, 3);
    }

    #[test]
    fn test_channels_unavailable_then_ready() {
        let mut c = HistoryFetchCoordinator::new(FetchConfig::default());
        let t = feed_metadata(&mut c, 3, 300, 0);
        assert_eq!(t.decision, Some(StartDecision::ChannelsUnavailable));
        assert!(t.command.is_none());

        let t = c.handle(FetchEvent::ChannelsChanged(ChannelAvailability::READY), NOW);
        assert_eq!(t.decision, Some(StartDecision::Started));
        assert!(t.command.is_some());
    }

    #[test]
    fn test_nothing_stored() {
        let mut c = ready();
        let t = feed_metadata(&mut c, 0, 300, 0);
        assert_eq!(t.decision, Some(StartDecision::NothingStored));
        assert!(!c.state().is_fetching);
    }

    #[test]
    fn test_timeout_returns_to_idle() {
        let mut c = HistoryFetchCoordinator::with_channels(
            FetchConfig::default().chunk_timeout(Duration::from_secs(30)),
            ChannelAvailability::READY,
        );
        feed_metadata(&mut c, 3, 300, 0);
        c.handle(FetchEvent::ChunkArrived(chunk(0, 1, &[400])), NOW);

        let t = c.handle(FetchEvent::Tick, NOW + time::Duration::seconds(10));
        assert!(t.outcome.is_none());
        assert!(c.state().is_fetching);

        let t = c.handle(FetchEvent::Tick, NOW + time::Duration::seconds(31));
        assert_eq!(
            t.outcome,
            Some(FetchOutcome::Incomplete {
                received: 1,
                expected: 3
            })
        );
        assert_eq!(c.phase(), FetchPhase::Idle);
        assert!(!c.state().is_fetching);
    }

    #[test]
    fn test_cancel() {
        let mut c = ready();
        assert!(c.cancel().is_none());

        feed_metadata(&mut c, 3, 300, 0);
        let t = c.cancel().unwrap();
        assert_eq!(
            t.outcome,
            Some(FetchOutcome::Cancelled {
                received: 0,
                expected: 3
            })
        );
        assert_eq!(c.phase(), FetchPhase::Idle);

        // A fresh metadata triplet can start a new backfill
        let t = feed_metadata(&mut c, 3, 300, 0);
        assert_eq!(t.decision, Some(StartDecision::Started));
        assert_eq!(c.pending().unwrap().token, RequestToken(2));
    }

    #[test]
    fn test_custom_metric_selector() {
        let mut c = HistoryFetchCoordinator::with_channels(
            FetchConfig::default().metric(1),
            ChannelAvailability::READY,
        );
        let t = feed_metadata(&mut c, 1, 300, 0);
        assert_eq!(t.command.unwrap().encode(), [0x61, 1, 1, 0]);
        let t = c.handle(FetchEvent::ChunkArrived(chunk(1, 1, &[400])), NOW);
        assert_eq!(t.outcome, Some(FetchOutcome::Complete { received: 1 }));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&FetchOutcome::Incomplete {
            received: 2,
            expected: 5,
        })
        .unwrap();
        assert_eq!(json, r#"{"Incomplete":{"received":2,"expected":5}}"#);
        let back: StartDecision = serde_json::from_str(r#""NothingStored""#).unwrap();
        assert_eq!(back, StartDecision::NothingStored);
    }
}
