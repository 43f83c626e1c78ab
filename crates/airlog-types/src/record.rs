//! Measurement records and the sink seam that consumes them.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};
use uuid::Uuid;

/// One environmental sample.
///
/// Records are immutable once built. Each carries a random identity that is
/// deliberately left out of equality: two records describing the same
/// reading compare equal even when produced by different decode passes.
///
/// # Example
///
/// ```
/// use airlog_types::MeasurementRecord;
/// use time::macros::datetime;
///
/// let a = MeasurementRecord::new(datetime!(2024-03-01 12:00:00.250 UTC), 612, 21.5, 40.0, 1012.3);
/// let b = MeasurementRecord::new(datetime!(2024-03-01 12:00:00.250 UTC), 612, 21.5, 40.0, 1012.3);
/// assert_eq!(a, b);
/// assert_ne!(a.id(), b.id());
/// assert_eq!(a.normalized().timestamp, datetime!(2024-03-01 12:00:00 UTC));
/// ```
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeasurementRecord {
    id: Uuid,
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// CO2 concentration in ppm.
    pub co2: u16,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Atmospheric pressure in hPa.
    pub pressure: f32,
}

impl MeasurementRecord {
    /// Build a record with a fresh identity.
    #[must_use]
    pub fn new(
        timestamp: OffsetDateTime,
        co2: u16,
        temperature: f32,
        humidity: f32,
        pressure: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            co2,
            temperature,
            humidity,
            pressure,
        }
    }

    /// The opaque identity assigned at construction.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The same reading with its timestamp floored to the whole second in UTC.
    ///
    /// Identity is preserved: normalization is not an update.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            timestamp: floor_to_second(self.timestamp),
            ..*self
        }
    }

    /// Unix second used as the dedup key.
    #[must_use]
    pub fn second_key(&self) -> i64 {
        self.timestamp.unix_timestamp()
    }
}

impl PartialEq for MeasurementRecord {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.co2 == other.co2
            && self.temperature == other.temperature
            && self.humidity == other.humidity
            && self.pressure == other.pressure
    }
}

/// Floor an instant to the whole second and express it in UTC.
#[must_use]
pub fn floor_to_second(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc - Duration::nanoseconds(i64::from(utc.nanosecond()))
}

/// Logical identifier of a physical sensor.
///
/// Assigned by an external registry; the core treats it as an opaque key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Destination for decoded records.
///
/// Implemented by the reconciliation store; sessions only ever talk to this
/// trait so the fetch logic can be exercised against an in-memory sink.
pub trait RecordSink {
    /// Merge records, optionally attributing them to a device.
    fn insert(&mut self, records: &[MeasurementRecord], device: Option<&DeviceId>);

    /// Called once with every record a completed backfill produced.
    fn archive_backfill(&mut self, _device: Option<&DeviceId>, _records: &[MeasurementRecord]) {}
}

impl RecordSink for Vec<MeasurementRecord> {
    fn insert(&mut self, records: &[MeasurementRecord], _device: Option<&DeviceId>) {
        self.extend_from_slice(records);
    }
}
