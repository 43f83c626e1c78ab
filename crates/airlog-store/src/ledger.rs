//! Partition ledger kept beside the canonical file.
//!
//! The canonical CSV carries only the merged record set. The ledger carries
//! every partition entry with its owning device and the insert that wrote it,
//! so a reopened store keeps device ownership and last-write order:
//!
//! ```text
//! device,seq,date,co2,temperature,humidity,pressure
//! kitchen,3,2024-01-02T03:04:05Z,612,21.5,40.0,1012.3
//! ,4,2024-01-02T03:09:05Z,640,21.6,41.0,1012.1
//! ```
//!
//! An empty device column is the unattributed partition. Floats are written
//! at full precision.

use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use airlog_types::{DeviceId, MeasurementRecord};

use crate::codec::replace_file;
use crate::error::{Error, Result};

/// One partition entry as read back from disk.
#[derive(Debug, Clone)]
pub(crate) struct LedgerEntry {
    pub device: Option<DeviceId>,
    pub seq: u64,
    pub record: MeasurementRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    device: String,
    seq: u64,
    #[serde(with = "time::serde::rfc3339")]
    date: OffsetDateTime,
    co2: u16,
    temperature: f32,
    humidity: f32,
    pressure: f32,
}

/// `records.csv` keeps its ledger in `records.ledger.csv`.
pub(crate) fn path_for(canonical: &Path) -> PathBuf {
    canonical.with_extension("ledger.csv")
}

/// Replace the ledger at `path` with `entries`.
pub(crate) fn write<'a>(
    path: &Path,
    entries: impl IntoIterator<Item = (Option<&'a DeviceId>, u64, &'a MeasurementRecord)>,
) -> Result<()> {
    replace_file(path, |file| {
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);
        for (device, seq, record) in entries {
            writer.serialize(LedgerRow {
                device: device.map(|d| d.as_str().to_string()).unwrap_or_default(),
                seq,
                date: record.timestamp,
                co2: record.co2,
                temperature: record.temperature,
                humidity: record.humidity,
                pressure: record.pressure,
            })?;
        }
        writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?
            .flush()?;
        Ok(())
    })
}

/// Read the ledger at `path`, or `None` when there is none.
///
/// Any malformed row fails the whole read.
pub(crate) fn read(path: &Path) -> Result<Option<Vec<LedgerEntry>>> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for row in ReaderBuilder::new().from_reader(file).deserialize() {
        let row: LedgerRow = row?;
        let device = (!row.device.is_empty()).then(|| DeviceId::new(row.device));
        entries.push(LedgerEntry {
            device,
            seq: row.seq,
            record: MeasurementRecord::new(
                row.date,
                row.co2,
                row.temperature,
                row.humidity,
                row.pressure,
            ),
        });
    }
    Ok(Some(entries))
}
