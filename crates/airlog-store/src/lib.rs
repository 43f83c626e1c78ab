//! Deduplicating record store and CSV codec for CO2 monitor telemetry.
//!
//! Records arriving from live notifications, history backfills and user
//! imports are merged into one time-ascending set with at most one record per
//! second, partitioned by device, and persisted as a canonical CSV file with
//! a ledger of device ownership beside it.
//!
//! # Features
//!
//! - Last-write-wins merge keyed by the whole second
//! - Per-device partitions with range and device deletes
//! - Tolerant CSV import (English/French vendor headers, unit hints)
//! - Atomic canonical CSV export
//! - Per-sync archive logs
//!
//! # Example
//!
//! ```no_run
//! use airlog_store::{RecordQuery, ReconciliationStore};
//!
//! let mut store = ReconciliationStore::open_default()?;
//! let report = store.import_file("export.csv", Some(&"kitchen".into()))?;
//! println!("{} imported, {} rejected", report.imported, report.errors + report.warnings);
//!
//! let latest = store.query(&RecordQuery::new().device("kitchen").newest_first().limit(10));
//! # Ok::<(), airlog_store::Error>(())
//! ```

pub mod codec;
mod error;
mod ledger;
mod models;
mod queries;
mod store;

pub use codec::{CANONICAL_HEADER, ParsedCsv};
pub use error::{Error, Result};
pub use models::{FieldStats, ImportReport, RecordStats, RowIssue, Severity};
pub use queries::RecordQuery;
pub use store::ReconciliationStore;

/// Default store path following platform conventions.
///
/// - Linux: `~/.local/share/airlog/records.csv`
/// - macOS: `~/Library/Application Support/airlog/records.csv`
/// - Windows: `C:\Users\<user>\AppData\Local\airlog\records.csv`
pub fn default_store_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airlog")
        .join("records.csv")
}
