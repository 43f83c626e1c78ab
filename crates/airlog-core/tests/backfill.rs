//! Integration tests for sync sessions against the mock transport.
//!
//! These tests use only the public API and a plain `Vec` sink.

use std::sync::Arc;
use std::time::Duration;

use airlog_core::mock::encode_current_reading;
use airlog_core::{
    FetchConfig, FetchOutcome, MockTransport, SessionEvent, StartDecision, SyncSession,
};
use airlog_types::MeasurementRecord;
use time::macros::datetime;
use tokio::sync::broadcast;

fn sample_history(n: u16) -> Vec<MeasurementRecord> {
    (0..n)
        .map(|i| {
            MeasurementRecord::new(
                datetime!(2024-06-01 00:00:00 UTC),
                500 + i * 10,
                20.0 + f32::from(i) * 0.05,
                45.5,
                1008.0,
            )
        })
        .collect()
}

fn config() -> FetchConfig {
    FetchConfig::default()
        .chunk_timeout(Duration::from_millis(500))
        .tick_interval(Duration::from_millis(25))
}

async fn finished(events: &mut broadcast::Receiver<SessionEvent>) -> FetchOutcome {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(SessionEvent::FetchFinished(outcome)) = events.recv().await {
                return outcome;
            }
        }
    })
    .await
    .expect("backfill did not finish")
}

// ==========================================================================
// Backfill
// ==========================================================================

#[tokio::test]
async fn test_eight_byte_entries_keep_humidity_precision() {
    let (transport, notifications) = MockTransport::builder()
        .metadata(4, 120, 0)
        .history(&sample_history(4))
        .eight_byte_entries()
        .chunk_size(3)
        .build();

    let (handle, task) = SyncSession::spawn(transport, Vec::new(), notifications, None, config());
    let mut events = handle.subscribe();

    let report = handle.sync_now().await.unwrap();
    assert_eq!(report.decision, StartDecision::Started);
    assert_eq!(finished(&mut events).await, FetchOutcome::Complete { received: 4 });

    handle.shutdown();
    let records = task.await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| (r.humidity - 45.5).abs() < 0.01));
    assert_eq!(
        records.iter().map(|r| r.co2).collect::<Vec<_>>(),
        vec![500, 510, 520, 530]
    );
}

#[tokio::test]
async fn test_minute_interval_is_normalized() {
    let (transport, notifications) = MockTransport::builder()
        .metadata(3, 10, 0)
        .history(&sample_history(3))
        .build();

    let (handle, task) = SyncSession::spawn(transport, Vec::new(), notifications, None, config());
    let mut events = handle.subscribe();

    handle.sync_now().await.unwrap();
    assert_eq!(finished(&mut events).await, FetchOutcome::Complete { received: 3 });

    handle.shutdown();
    let records = task.await.unwrap();
    assert_eq!((records[2].timestamp - records[1].timestamp).whole_seconds(), 600);
}

#[tokio::test]
async fn test_repeated_sync_after_completion_starts_again() {
    let history = sample_history(2);
    let (transport, notifications) = MockTransport::builder()
        .current_reading(&encode_current_reading(&history[1], 60, 5))
        .metadata(2, 60, 5)
        .history(&history)
        .build();
    let transport = Arc::new(transport);

    let (handle, task) =
        SyncSession::spawn(transport.clone(), Vec::new(), notifications, None, config());
    let mut events = handle.subscribe();

    for _ in 0..2 {
        let report = handle.sync_now().await.unwrap();
        assert_eq!(report.decision, StartDecision::Started);
        assert_eq!(report.current.map(|r| r.co2), Some(510));
        assert_eq!(finished(&mut events).await, FetchOutcome::Complete { received: 2 });
    }
    assert_eq!(transport.writes().await.len(), 2);

    handle.shutdown();
    task.await.unwrap();
}

#[tokio::test]
async fn test_empty_device_reports_nothing_stored() {
    let (transport, notifications) = MockTransport::builder().metadata(0, 300, 0).build();
    let transport = Arc::new(transport);

    let (handle, task) =
        SyncSession::spawn(transport.clone(), Vec::new(), notifications, None, config());

    let report = handle.sync_now().await.unwrap();
    assert_eq!(report.decision, StartDecision::NothingStored);
    assert!(transport.writes().await.is_empty());

    handle.shutdown();
    assert!(task.await.unwrap().is_empty());
}
