//! Measurement records and wire-format decoders for CO2 monitor telemetry.
//!
//! This crate is the platform-agnostic layer shared by the fetch
//! coordinator (airlog-core) and the record store (airlog-store).
//!
//! # Features
//!
//! - [`MeasurementRecord`], the one sample type everything exchanges
//! - Stateless decoders for current readings and history chunks
//! - Backfill command encoding and history chunk framing
//! - UUID constants for the sensor's GATT characteristics
//!
//! # Example
//!
//! ```
//! use airlog_types::decode::{decode_current_reading, decode_history_chunk};
//! use time::macros::datetime;
//!
//! let now = datetime!(2024-05-01 10:00:00 UTC);
//! let reading = decode_current_reading(&[0x90, 0x01, 0xB4, 0x01, 0x95, 0x27, 0x28], now);
//! assert_eq!(reading.map(|r| r.co2), Some(400));
//!
//! let history = decode_history_chunk(&[0u8; 21], now, 300);
//! assert_eq!(history.len(), 3);
//! ```

pub mod decode;
pub mod error;
pub mod protocol;
pub mod record;
pub mod uuid;

pub use decode::{decode_current_reading, decode_current_reading_now, decode_history_chunk};
pub use error::{ParseError, ParseResult};
pub use protocol::{BackfillCommand, HistoryChunk};
pub use record::{DeviceId, MeasurementRecord, RecordSink, floor_to_second};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // --- MeasurementRecord tests ---

    #[test]
    fn test_equality_ignores_identity() {
        let ts = datetime!(2024-01-01 00:00:00 UTC);
        let a = MeasurementRecord::new(ts, 800, 22.5, 45.0, 1013.2);
        let b = MeasurementRecord::new(ts, 800, 22.5, 45.0, 1013.2);
        assert_eq!(a, b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_normalized_floors_and_keeps_identity() {
        let record = MeasurementRecord::new(
            datetime!(2024-01-01 00:00:05.999 UTC),
            800,
            22.5,
            45.0,
            1013.2,
        );
        let normalized = record.normalized();
        assert_eq!(normalized.timestamp, datetime!(2024-01-01 00:00:05 UTC));
        assert_eq!(normalized.id(), record.id());
        assert_eq!(normalized.second_key(), record.second_key());
    }

    #[test]
    fn test_floor_converts_to_utc() {
        let local = datetime!(2024-01-01 02:00:00.5 +02:00);
        assert_eq!(floor_to_second(local), datetime!(2024-01-01 00:00:00 UTC));
    }

    #[test]
    fn test_floor_before_epoch() {
        let ts = datetime!(1969-12-31 23:59:59.250 UTC);
        assert_eq!(floor_to_second(ts).unix_timestamp(), -1);
    }

    // --- DeviceId tests ---

    #[test]
    fn test_device_id_display_and_conversions() {
        let id = DeviceId::from("kitchen");
        assert_eq!(id.as_str(), "kitchen");
        assert_eq!(id.to_string(), "kitchen");
        assert_eq!(id, DeviceId::new(String::from("kitchen")));
    }

    // --- RecordSink tests ---

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<MeasurementRecord> = Vec::new();
        let record = MeasurementRecord::new(datetime!(2024-01-01 00:00:00 UTC), 1, 2.0, 3.0, 4.0);
        RecordSink::insert(&mut sink, &[record], None);
        sink.archive_backfill(None, &[record]);
        assert_eq!(sink.len(), 1);
    }

    // --- Serialization tests ---

    #[test]
    fn test_record_serialization() {
        let record = MeasurementRecord::new(
            datetime!(2024-01-01 12:30:00 UTC),
            800,
            22.5,
            45.0,
            1013.2,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"co2\":800"));
        assert!(json.contains("2024-01-01T12:30:00Z"));

        let back: MeasurementRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.id(), record.id());
    }

    #[test]
    fn test_device_id_serializes_transparently() {
        let json = serde_json::to_string(&DeviceId::new("sensor-1")).unwrap();
        assert_eq!(json, "\"sensor-1\"");
    }
}
