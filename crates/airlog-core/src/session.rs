//! The serialized execution context owning fetch and store state.
//!
//! A [`SyncSession`] runs as a single Tokio task. Transport notifications,
//! scheduler-triggered sync cycles and user imports all reach it through
//! channels, so every check-then-act sequence (the backfill exclusion token,
//! the store's dedup-then-merge) runs without interleaving and without locks.
//!
//! The session never waits for a chunk. Chunks are just notifications; a
//! periodic tick drives the chunk timeout.
//!
//! # Example
//!
//! ```ignore
//! use airlog_core::{FetchConfig, MockTransport, SyncSession};
//!
//! let (transport, notifications) = MockTransport::builder().metadata(3, 300, 0).build();
//! let (handle, task) = SyncSession::spawn(transport, Vec::new(), notifications, None, FetchConfig::default());
//! let report = handle.sync_now().await?;
//! handle.shutdown();
//! let records = task.await?;
//! ```

use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use airlog_types::protocol::{HistoryChunk, decode_metadata_value};
use airlog_types::{DeviceId, MeasurementRecord, RecordSink, decode_current_reading};

use crate::error::{Error, Result};
use crate::fetch::{
    FetchConfig, FetchEvent, FetchOutcome, FetchPhase, HistoryFetchCoordinator, MetadataKind,
    StartDecision, Transition,
};
use crate::traits::{Channel, ChannelAvailability, Notification, Transport};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 32;

/// Capacity of the event broadcast channel.
const EVENT_BUFFER: usize = 64;

/// Result of one sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// The current reading, when the channel delivered a valid frame.
    pub current: Option<MeasurementRecord>,
    /// Whether the cycle started a backfill, and if not, why.
    pub decision: StartDecision,
}

/// Snapshot of the session's fetch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    /// Coordinator phase.
    pub phase: FetchPhase,
    /// Records still expected from the in-flight backfill.
    pub remaining_records: i64,
    /// Whether a backfill is in flight.
    pub is_fetching: bool,
    /// How the most recent backfill ended.
    pub last_outcome: Option<FetchOutcome>,
}

/// Progress notifications broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A backfill command was written.
    FetchStarted {
        /// Records announced by the device.
        expected: u32,
    },
    /// Records were handed to the sink.
    RecordsStored {
        /// Number of records.
        count: usize,
        /// True when they came from a backfill chunk.
        backfill: bool,
    },
    /// A backfill ended.
    FetchFinished(FetchOutcome),
}

/// Requests accepted by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Read the current reading and metadata, possibly starting a backfill.
    SyncNow {
        /// Reply channel.
        reply: oneshot::Sender<Result<SyncReport>>,
    },
    /// Merge externally obtained records.
    Ingest {
        /// Records to merge.
        records: Vec<MeasurementRecord>,
        /// Device to attribute them to.
        device: Option<DeviceId>,
        /// Reply channel, answered with the number of records handed over.
        reply: oneshot::Sender<usize>,
    },
    /// Abort the in-flight backfill.
    CancelFetch {
        /// Reply channel.
        reply: oneshot::Sender<Option<FetchOutcome>>,
    },
    /// Report the fetch state.
    Status {
        /// Reply channel.
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Cloneable front end of a running [`SyncSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionHandle {
    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> SessionCommand,
    ) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Perform one sync cycle.
    ///
    /// This is the entry point a scheduler calls: read the current reading
    /// and the three metadata channels, then start a backfill if possible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] when the session has stopped, or the
    /// transport error of a failed read.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.request(|reply| SessionCommand::SyncNow { reply }).await?
    }

    /// Merge records (for example from a file import) through the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] when the session has stopped.
    pub async fn ingest(
        &self,
        records: Vec<MeasurementRecord>,
        device: Option<DeviceId>,
    ) -> Result<usize> {
        self.request(|reply| SessionCommand::Ingest {
            records,
            device,
            reply,
        })
        .await
    }

    /// Abort the in-flight backfill, returning its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] when the session has stopped.
    pub async fn cancel_fetch(&self) -> Result<Option<FetchOutcome>> {
        self.request(|reply| SessionCommand::CancelFetch { reply })
            .await
    }

    /// Snapshot of the fetch state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] when the session has stopped.
    pub async fn status(&self) -> Result<SessionStatus> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// Receive progress events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stop the session. The task returns its sink.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Actor owning a [`HistoryFetchCoordinator`] and a [`RecordSink`].
pub struct SyncSession<T, S> {
    transport: T,
    sink: S,
    device: Option<DeviceId>,
    coordinator: HistoryFetchCoordinator,
    notifications: mpsc::Receiver<Notification>,
    commands: mpsc::Receiver<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    backfill: Vec<MeasurementRecord>,
    last_outcome: Option<FetchOutcome>,
}

impl<T, S> std::fmt::Debug for SyncSession<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("device", &self.device)
            .field("phase", &self.coordinator.phase())
            .field("buffered", &self.backfill.len())
            .finish()
    }
}

impl<T: Transport, S: RecordSink> SyncSession<T, S> {
    /// Build a session and its handle without starting it.
    ///
    /// Records that arrive are attributed to `device`.
    pub fn new(
        transport: T,
        sink: S,
        notifications: mpsc::Receiver<Notification>,
        device: Option<DeviceId>,
        config: FetchConfig,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();

        let handle = SessionHandle {
            commands: command_tx,
            events: event_tx.clone(),
            cancel: cancel.clone(),
        };

        let session = Self {
            transport,
            sink,
            device,
            coordinator: HistoryFetchCoordinator::new(config),
            notifications,
            commands: command_rx,
            events: event_tx,
            cancel,
            backfill: Vec::new(),
            last_outcome: None,
        };

        (session, handle)
    }

    /// Run until shut down or every handle is dropped, returning the sink.
    pub async fn run(mut self) -> S {
        info!(device = ?self.device, "Sync session started");

        let mut ticker = interval(self.coordinator.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sync session received shutdown");
                    break;
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            info!("All session handles dropped, shutting down");
                            break;
                        }
                    }
                }
                Some(notification) = self.notifications.recv() => {
                    self.handle_notification(notification).await;
                }
                _ = ticker.tick() => {
                    let transition = self.coordinator.handle(FetchEvent::Tick, OffsetDateTime::now_utc());
                    self.apply(transition).await;
                }
            }
        }

        if self.coordinator.state().is_fetching {
            warn!(
                remaining = self.coordinator.state().remaining_records,
                "Sync session stopped with a backfill in flight"
            );
        }
        info!("Sync session stopped");
        self.sink
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SyncNow { reply } => {
                let result = self.sync_cycle().await;
                let _ = reply.send(result);
            }
            SessionCommand::Ingest {
                records,
                device,
                reply,
            } => {
                let count = records.len();
                if count > 0 {
                    self.sink.insert(&records, device.as_ref());
                    debug!(count, device = ?device, "Ingested records");
                    let _ = self.events.send(SessionEvent::RecordsStored {
                        count,
                        backfill: false,
                    });
                }
                let _ = reply.send(count);
            }
            SessionCommand::CancelFetch { reply } => {
                let outcome = match self.coordinator.cancel() {
                    Some(transition) => {
                        let outcome = transition.outcome;
                        self.apply(transition).await;
                        outcome
                    }
                    None => None,
                };
                let _ = reply.send(outcome);
            }
            SessionCommand::Status { reply } => {
                let state = self.coordinator.state();
                let _ = reply.send(SessionStatus {
                    phase: self.coordinator.phase(),
                    remaining_records: state.remaining_records,
                    is_fetching: state.is_fetching,
                    last_outcome: self.last_outcome,
                });
            }
        }
    }

    async fn sync_cycle(&mut self) -> Result<SyncReport> {
        let now = OffsetDateTime::now_utc();

        let channels = ChannelAvailability::detect(&self.transport);
        let transition = self
            .coordinator
            .handle(FetchEvent::ChannelsChanged(channels), now);
        let mut decision = transition.decision;
        self.apply(transition).await;

        let current = if self.transport.has_channel(Channel::CurrentReading) {
            let data = self.transport.read(Channel::CurrentReading).await?;
            let record = decode_current_reading(&data, now);
            match record {
                Some(record) => self.store(&[record], false),
                None => debug!(len = data.len(), "Current reading frame too short"),
            }
            record
        } else {
            None
        };

        let transport = &self.transport;
        let (total, interval, age) = futures::try_join!(
            read_metadata(transport, MetadataKind::TotalReadings),
            read_metadata(transport, MetadataKind::Interval),
            read_metadata(transport, MetadataKind::LastReadingAge),
        )?;

        for (kind, value) in MetadataKind::ALL.into_iter().zip([total, interval, age]) {
            if let Some(value) = value {
                let transition = self
                    .coordinator
                    .handle(FetchEvent::MetadataArrived(kind, value), now);
                decision = transition.decision.or(decision);
                self.apply(transition).await;
            }
        }

        let decision = decision.unwrap_or(StartDecision::MissingMetadata);
        debug!(?decision, current = current.is_some(), "Sync cycle finished");
        Ok(SyncReport { current, decision })
    }

    async fn handle_notification(&mut self, notification: Notification) {
        let now = OffsetDateTime::now_utc();
        let Notification { channel, data } = notification;

        match channel {
            Channel::HistoryChunk => match HistoryChunk::try_parse(&data) {
                Ok(chunk) => {
                    let transition = self.coordinator.handle(FetchEvent::ChunkArrived(chunk), now);
                    self.apply(transition).await;
                }
                Err(e) => warn!(error = %e, "Discarding malformed history chunk"),
            },
            Channel::CurrentReading => {
                if let Some(record) = decode_current_reading(&data, now) {
                    self.store(&[record], false);
                }
            }
            Channel::TotalReadings | Channel::Interval | Channel::SecondsSinceUpdate => {
                let kind = MetadataKind::from_channel(channel);
                if let (Some(kind), Some(value)) = (kind, decode_metadata_value(&data)) {
                    let transition = self
                        .coordinator
                        .handle(FetchEvent::MetadataArrived(kind, value), now);
                    self.apply(transition).await;
                }
            }
            Channel::Command => debug!("Ignoring notification on command channel"),
        }
    }

    /// Carry out what a transition asks for.
    async fn apply(&mut self, transition: Transition) {
        let Transition {
            records,
            command,
            decision: _,
            outcome,
        } = transition;

        if !records.is_empty() {
            self.store(&records, true);
            self.backfill.extend_from_slice(&records);
        }

        let mut outcome = outcome;

        if let Some(command) = command {
            let expected = self
                .coordinator
                .pending()
                .map(|p| p.expected)
                .unwrap_or_default();
            match self
                .transport
                .write(Channel::Command, &command.encode())
                .await
            {
                Ok(()) => {
                    let _ = self.events.send(SessionEvent::FetchStarted { expected });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to write backfill command");
                    outcome = self.coordinator.cancel().and_then(|t| t.outcome);
                }
            }
        }

        if let Some(outcome) = outcome {
            self.finish_backfill(outcome);
        }
    }

    fn store(&mut self, records: &[MeasurementRecord], backfill: bool) {
        self.sink.insert(records, self.device.as_ref());
        let _ = self.events.send(SessionEvent::RecordsStored {
            count: records.len(),
            backfill,
        });
    }

    fn finish_backfill(&mut self, outcome: FetchOutcome) {
        let records = std::mem::take(&mut self.backfill);
        if matches!(outcome, FetchOutcome::Complete { .. }) {
            self.sink.archive_backfill(self.device.as_ref(), &records);
        }
        self.last_outcome = Some(outcome);
        let _ = self.events.send(SessionEvent::FetchFinished(outcome));
    }
}

impl<T, S> SyncSession<T, S>
where
    T: Transport + 'static,
    S: RecordSink + Send + 'static,
{
    /// Build a session and run it on a new Tokio task.
    pub fn spawn(
        transport: T,
        sink: S,
        notifications: mpsc::Receiver<Notification>,
        device: Option<DeviceId>,
        config: FetchConfig,
    ) -> (SessionHandle, JoinHandle<S>) {
        let (session, handle) = Self::new(transport, sink, notifications, device, config);
        (handle, tokio::spawn(session.run()))
    }
}

async fn read_metadata<T: Transport + ?Sized>(
    transport: &T,
    kind: MetadataKind,
) -> Result<Option<u32>> {
    let channel = kind.channel();
    if !transport.has_channel(channel) {
        return Ok(None);
    }
    let data = transport.read(channel).await?;
    Ok(decode_metadata_value(&data))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockTransport;
    use time::macros::datetime;

    #[derive(Debug, Default)]
    struct RecordingSink {
        inserted: Vec<(MeasurementRecord, Option<DeviceId>)>,
        archived: Vec<usize>,
    }

    impl RecordSink for RecordingSink {
        fn insert(&mut self, records: &[MeasurementRecord], device: Option<&DeviceId>) {
            self.inserted
                .extend(records.iter().map(|r| (*r, device.cloned())));
        }

        fn archive_backfill(&mut self, _device: Option<&DeviceId>, records: &[MeasurementRecord]) {
            self.archived.push(records.len());
        }
    }

    fn history(n: u16) -> Vec<MeasurementRecord> {
        (0..n)
            .map(|i| {
                MeasurementRecord::new(
                    datetime!(2024-01-01 00:00:00 UTC),
                    400 + i,
                    21.0,
                    45.0,
                    1010.0,
                )
            })
            .collect()
    }

    fn fast_config() -> FetchConfig {
        FetchConfig::default()
            .chunk_timeout(Duration::from_millis(150))
            .tick_interval(Duration::from_millis(20))
    }

    async fn wait_finished(rx: &mut broadcast::Receiver<SessionEvent>) -> FetchOutcome {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(SessionEvent::FetchFinished(outcome)) = rx.recv().await {
                    return outcome;
                }
            }
        })
        .await
        .expect("backfill did not finish")
    }

    #[tokio::test]
    async fn test_full_backfill() {
        let (transport, notifications) = MockTransport::builder()
            .current_reading(&[0x90, 0x01, 0xB4, 0x01, 0x95, 0x27, 0x28])
            .metadata(5, 60, 10)
            .history(&history(5))
            .chunk_size(2)
            .build();
        let transport = std::sync::Arc::new(transport);

        let (handle, task) = SyncSession::spawn(
            transport.clone(),
            RecordingSink::default(),
            notifications,
            Some(DeviceId::new("kitchen")),
            fast_config(),
        );
        let mut events = handle.subscribe();

        let report = handle.sync_now().await.unwrap();
        assert_eq!(report.decision, StartDecision::Started);
        assert_eq!(report.current.map(|r| r.co2), Some(400));

        let outcome = wait_finished(&mut events).await;
        assert_eq!(outcome, FetchOutcome::Complete { received: 5 });

        let status = handle.status().await.unwrap();
        assert!(!status.is_fetching);
        assert_eq!(status.last_outcome, Some(outcome));

        handle.shutdown();
        let sink = task.await.unwrap();
        assert_eq!(sink.inserted.len(), 6);
        assert!(
            sink.inserted
                .iter()
                .all(|(_, d)| d.as_ref().map(DeviceId::as_str) == Some("kitchen"))
        );
        assert_eq!(sink.archived, vec![5]);

        // Entries are spaced by the interval and end at now - age
        let backfilled: Vec<_> = sink.inserted[1..].iter().map(|(r, _)| r).collect();
        for pair in backfilled.windows(2) {
            assert_eq!((pair[1].timestamp - pair[0].timestamp).whole_seconds(), 60);
        }
        assert_eq!(backfilled[0].co2, 400);
        assert_eq!(backfilled[4].co2, 404);

        let writes = transport.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.as_ref(), &[0x61, 0x00, 0x01, 0x00]);
    }

    #[tokio::test]
    async fn test_second_sync_while_fetching() {
        let (transport, notifications) = MockTransport::builder()
            .metadata(5, 60, 10)
            .history(&history(5))
            .stop_after_chunks(0)
            .build();
        let transport = std::sync::Arc::new(transport);

        let (handle, task) = SyncSession::spawn(
            transport.clone(),
            Vec::new(),
            notifications,
            None,
            FetchConfig::default(),
        );

        let first = handle.sync_now().await.unwrap();
        let second = handle.sync_now().await.unwrap();
        assert_eq!(first.decision, StartDecision::Started);
        assert_eq!(second.decision, StartDecision::AlreadyFetching);
        assert_eq!(transport.writes().await.len(), 1);

        let outcome = handle.cancel_fetch().await.unwrap();
        assert_eq!(
            outcome,
            Some(FetchOutcome::Cancelled {
                received: 0,
                expected: 5
            })
        );
        assert_eq!(handle.cancel_fetch().await.unwrap(), None);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_chunk_timeout() {
        let (transport, notifications) = MockTransport::builder()
            .metadata(5, 60, 0)
            .history(&history(5))
            .chunk_size(2)
            .stop_after_chunks(1)
            .build();

        let (handle, task) =
            SyncSession::spawn(transport, Vec::new(), notifications, None, fast_config());
        let mut events = handle.subscribe();

        handle.sync_now().await.unwrap();
        let outcome = wait_finished(&mut events).await;
        assert_eq!(
            outcome,
            FetchOutcome::Incomplete {
                received: 2,
                expected: 5
            }
        );

        handle.shutdown();
        let records = task.await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_command_write_failure_cancels() {
        let (transport, notifications) = MockTransport::builder()
            .metadata(5, 60, 0)
            .history(&history(5))
            .fail_writes(true)
            .build();

        let (handle, task) = SyncSession::spawn(
            transport,
            RecordingSink::default(),
            notifications,
            None,
            fast_config(),
        );
        let mut events = handle.subscribe();

        let report = handle.sync_now().await.unwrap();
        assert_eq!(report.decision, StartDecision::Started);
        assert!(matches!(
            wait_finished(&mut events).await,
            FetchOutcome::Cancelled { received: 0, .. }
        ));
        assert!(!handle.status().await.unwrap().is_fetching);

        handle.shutdown();
        let sink = task.await.unwrap();
        assert!(sink.archived.is_empty());
    }

    #[tokio::test]
    async fn test_missing_command_channel() {
        let (transport, notifications) = MockTransport::builder()
            .metadata(5, 60, 0)
            .without_channel(Channel::Command)
            .build();

        let (handle, task) = SyncSession::spawn(
            transport,
            Vec::new(),
            notifications,
            None,
            FetchConfig::default(),
        );

        let report = handle.sync_now().await.unwrap();
        assert_eq!(report.decision, StartDecision::ChannelsUnavailable);
        assert!(report.current.is_none());

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_metadata_notifications_start_backfill() {
        let (transport, notifications) = MockTransport::builder()
            .history(&history(3))
            .build();
        let transport = std::sync::Arc::new(transport);

        let (handle, task) = SyncSession::spawn(
            transport.clone(),
            RecordingSink::default(),
            notifications,
            None,
            fast_config(),
        );
        let mut events = handle.subscribe();

        // No metadata readable yet
        let report = handle.sync_now().await.unwrap();
        assert_eq!(report.decision, StartDecision::MissingMetadata);

        transport.notify(Channel::TotalReadings, &3u16.to_le_bytes()).await;
        transport.notify(Channel::Interval, &[5]).await;
        transport.notify(Channel::SecondsSinceUpdate, &30u16.to_le_bytes()).await;

        assert_eq!(
            wait_finished(&mut events).await,
            FetchOutcome::Complete { received: 3 }
        );

        handle.shutdown();
        let sink = task.await.unwrap();
        let stamps: Vec<_> = sink.inserted.iter().map(|(r, _)| r.timestamp).collect();
        assert_eq!((stamps[1] - stamps[0]).whole_seconds(), 300);
    }

    #[tokio::test]
    async fn test_ingest_and_closed_session() {
        let (transport, notifications) = MockTransport::builder().build();
        let (handle, task) = SyncSession::spawn(
            transport,
            RecordingSink::default(),
            notifications,
            None,
            FetchConfig::default(),
        );

        let count = handle
            .ingest(history(4), Some(DeviceId::new("office")))
            .await
            .unwrap();
        assert_eq!(count, 4);

        handle.shutdown();
        let sink = task.await.unwrap();
        assert_eq!(sink.inserted.len(), 4);
        assert_eq!(sink.inserted[0].1, Some(DeviceId::new("office")));

        assert!(matches!(handle.sync_now().await, Err(Error::SessionClosed)));
        assert!(matches!(handle.status().await, Err(Error::SessionClosed)));
    }
}
