//! Simulate command - run one sync cycle against a scripted sensor.
//!
//! The simulated sensor serves a current reading, the three metadata values
//! and a history ring buffer streamed in chunks once the backfill command is
//! written. The session stores everything it receives in the record store.

use std::time::Duration;

use airlog_core::mock::encode_current_reading;
use airlog_core::{FetchOutcome, MockTransport, SessionEvent, StartDecision, SyncSession};
use airlog_types::{DeviceId, MeasurementRecord};
use anyhow::{Context as _, Result};
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::Context;
use crate::format::{describe_outcome, format_timestamp};
use crate::style;

/// Age in seconds of the newest sample on the simulated sensor.
const SIMULATED_AGE_SECS: u16 = 42;

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub device: Option<DeviceId>,
    pub records: u16,
    pub interval: u16,
    pub chunk_size: usize,
    pub drop_after: Option<usize>,
    pub wide_entries: bool,
}

/// Execute the simulate command.
pub async fn cmd_simulate(args: SimulateArgs, ctx: &Context) -> Result<()> {
    let history = synthetic_history(args.records);
    let latest = history
        .last()
        .copied()
        .unwrap_or_else(|| MeasurementRecord::new(OffsetDateTime::now_utc(), 450, 21.0, 40.0, 1012.0));

    let mut builder = MockTransport::builder()
        .current_reading(&encode_current_reading(
            &latest,
            args.interval,
            SIMULATED_AGE_SECS,
        ))
        .metadata(args.records, args.interval, SIMULATED_AGE_SECS)
        .history(&history)
        .chunk_size(args.chunk_size);
    if let Some(chunks) = args.drop_after {
        builder = builder.stop_after_chunks(chunks);
    }
    if args.wide_entries {
        builder = builder.eight_byte_entries();
    }
    let (transport, notifications) = builder.build();

    let store = ctx.open_store()?;
    let fetch = ctx.config.fetch.to_fetch_config();
    info!(
        records = args.records,
        interval = args.interval,
        "Starting simulated sync"
    );
    let (handle, task) =
        SyncSession::spawn(transport, store, notifications, args.device.clone(), fetch);

    let mut events = handle.subscribe();
    let report = handle.sync_now().await.context("Sync cycle failed")?;

    let no_color = ctx.opts.no_color;
    if let Some(current) = &report.current {
        ctx.status(&style::format_success(
            &format!(
                "Current reading: {} ppm at {}",
                style::format_co2_colored(current.co2, no_color),
                format_timestamp(current.timestamp)
            ),
            no_color,
        ));
    }

    let outcome = if report.decision == StartDecision::Started {
        let wait = ctx.config.fetch.chunk_timeout() * 2 + Duration::from_secs(5);
        wait_for_outcome(&mut events, wait).await
    } else {
        ctx.status(&style::format_warning(
            &format!("No backfill started: {:?}", report.decision),
            no_color,
        ));
        None
    };

    handle.shutdown();
    let store = task.await.context("Sync session task failed")?;

    match outcome {
        Some(outcome @ FetchOutcome::Complete { .. }) => {
            ctx.status(&style::format_success(&describe_outcome(&outcome), no_color));
        }
        Some(outcome) => {
            ctx.status(&style::format_warning(&describe_outcome(&outcome), no_color));
        }
        None if report.decision == StartDecision::Started => {
            ctx.status(&style::format_warning(
                "Backfill did not finish before the session stopped",
                no_color,
            ));
        }
        None => {}
    }

    let attributed = args
        .device
        .as_ref()
        .map(|d| format!(", {} attributed to {}", store.records_for(d).len(), d))
        .unwrap_or_default();
    ctx.status(&format!(
        "Store now holds {} records{} ({})",
        store.len(),
        attributed,
        store.path().display()
    ));
    Ok(())
}

async fn wait_for_outcome(
    events: &mut broadcast::Receiver<SessionEvent>,
    wait: Duration,
) -> Option<FetchOutcome> {
    let finished = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::FetchFinished(outcome)) => return Some(outcome),
                Ok(event) => debug!(?event, "Session event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed session events"),
                Err(RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(wait, finished).await.ok().flatten()
}

/// A day-shaped series; timestamps are reassigned by the coordinator.
fn synthetic_history(count: u16) -> Vec<MeasurementRecord> {
    let now = OffsetDateTime::now_utc();
    (0..count)
        .map(|i| {
            let phase = f32::from(i % 24) / 24.0 * std::f32::consts::TAU;
            MeasurementRecord::new(
                now,
                (600.0 + phase.sin() * 250.0).round() as u16,
                21.0 + phase.cos() * 1.5,
                f32::from(40 + i % 7),
                1012.0 + f32::from(i % 5) * 0.1,
            )
        })
        .collect()
}
