//! History backfill and sync sessions for CO2 monitor telemetry.
//!
//! This crate turns a sensor link into a stream of timestamped
//! [`MeasurementRecord`](airlog_types::MeasurementRecord)s. The link itself
//! (scanning, pairing, reconnection) lives behind the [`Transport`] trait.
//!
//! # Features
//!
//! - **Backfill coordination**: [`HistoryFetchCoordinator`] sequences
//!   metadata discovery and chunked history download as a pure state machine
//! - **Timestamp reconstruction**: absolute times for ring-buffer entries
//!   that arrive without one
//! - **Sync sessions**: [`SyncSession`] owns the coordinator and a record
//!   sink in one task, so concurrent inputs never interleave
//! - **Testing**: [`MockTransport`] replays scripted history
//!
//! # Quick Start
//!
//! ```no_run
//! use airlog_core::{FetchConfig, MockTransport, SyncSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, notifications) = MockTransport::builder()
//!         .metadata(3, 300, 10)
//!         .build();
//!
//!     let (handle, task) =
//!         SyncSession::spawn(transport, Vec::new(), notifications, None, FetchConfig::default());
//!
//!     let report = handle.sync_now().await?;
//!     println!("Backfill: {:?}", report.decision);
//!
//!     handle.shutdown();
//!     let records = task.await?;
//!     println!("{} records", records.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fetch;
pub mod mock;
pub mod session;
pub mod traits;

pub use error::{Error, Result};
pub use fetch::{
    DeviceFetchState, FetchConfig, FetchEvent, FetchOutcome, FetchPhase, HistoryFetchCoordinator,
    MetadataKind, PendingRequest, RequestToken, StartDecision, Transition,
};
pub use mock::{MockTransport, MockTransportBuilder};
pub use session::{SessionEvent, SessionHandle, SessionStatus, SyncReport, SyncSession};
pub use traits::{Channel, ChannelAvailability, Notification, Transport};

// Re-export the shared types crate
pub use airlog_types;
