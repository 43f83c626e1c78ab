//! Decoders turning raw channel buffers into [`MeasurementRecord`]s.
//!
//! All multi-byte integers are little-endian. Malformed frames decode to
//! "no record" instead of an error: a short buffer on the readings channel is
//! a normal occurrence while the link settles.
//!
//! # Current reading layouts
//!
//! | Length | Variant | Timestamp |
//! |--------|---------|-----------|
//! | `>= 13` | [`CurrentReadingFormat::Full`] | `now - age_seconds` (bytes 11-12) |
//! | 11-12 | [`CurrentReadingFormat::LegacyMinutes`] | `now - age_min * interval_min * 60` (bytes 9, 10) |
//! | 7-10 | [`CurrentReadingFormat::Basic`] | `now` |
//!
//! Bytes 0-6 are shared: CO2 `u16`, temperature `i16 / 20`, pressure
//! `u16 / 10`, humidity `u8`.
//!
//! # History entries
//!
//! History payloads are packed 7-byte entries (humidity as one byte, percent)
//! or 8-byte entries (humidity as `u16 / 100`). The width is inferred from the
//! payload length; see [`EntryStride::infer`].

use bytes::Buf;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::record::MeasurementRecord;

/// Minimum number of bytes for any current reading.
pub const MIN_CURRENT_READING_BYTES: usize = 7;

/// Length at which legacy minute-based interval/age bytes appear.
pub const LEGACY_CURRENT_READING_BYTES: usize = 11;

/// Length at which second-based interval/age fields appear.
pub const FULL_CURRENT_READING_BYTES: usize = 13;

/// Which current-reading variant a buffer length selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentReadingFormat {
    /// 13+ bytes: interval and age in seconds.
    Full,
    /// 11-12 bytes: interval and age in whole minutes.
    LegacyMinutes,
    /// 7-10 bytes: no age information.
    Basic,
}

impl CurrentReadingFormat {
    /// Classify a buffer length; `None` below the 7-byte minimum.
    #[must_use]
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            n if n >= FULL_CURRENT_READING_BYTES => Some(Self::Full),
            n if n >= LEGACY_CURRENT_READING_BYTES => Some(Self::LegacyMinutes),
            n if n >= MIN_CURRENT_READING_BYTES => Some(Self::Basic),
            _ => None,
        }
    }
}

/// Byte width of one history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStride {
    /// 7 bytes, humidity as a single percent byte.
    Seven,
    /// 8 bytes, humidity as hundredths of a percent.
    Eight,
}

impl EntryStride {
    /// Width in bytes.
    #[must_use]
    pub fn width(self) -> usize {
        match self {
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }

    /// Infer the stride from a payload length.
    ///
    /// Lengths divisible by both widths resolve to [`EntryStride::Seven`].
    ///
    /// ```
    /// use airlog_types::decode::EntryStride;
    ///
    /// assert_eq!(EntryStride::infer(21), Some(EntryStride::Seven));
    /// assert_eq!(EntryStride::infer(24), Some(EntryStride::Eight));
    /// assert_eq!(EntryStride::infer(10), None);
    /// ```
    #[must_use]
    pub fn infer(len: usize) -> Option<Self> {
        if len % 7 == 0 {
            Some(Self::Seven)
        } else if len % 8 == 0 {
            Some(Self::Eight)
        } else {
            None
        }
    }
}

/// Convert raw temperature value to Celsius.
pub fn raw_to_temperature(raw: i16) -> f32 {
    f32::from(raw) / 20.0
}

/// Convert raw pressure value to hPa.
pub fn raw_to_pressure(raw: u16) -> f32 {
    f32::from(raw) / 10.0
}

/// Decode a current-reading buffer, timestamping it relative to `now`.
///
/// Returns `None` for buffers shorter than [`MIN_CURRENT_READING_BYTES`].
///
/// ```
/// use airlog_types::decode::decode_current_reading;
/// use time::macros::datetime;
///
/// let now = datetime!(2024-05-01 10:00:00 UTC);
/// let bytes = [0x20, 0x03, 0xC2, 0x01, 0x94, 0x27, 45];
/// let record = decode_current_reading(&bytes, now).unwrap();
/// assert_eq!(record.co2, 800);
/// assert_eq!(record.timestamp, now);
/// ```
#[must_use]
pub fn decode_current_reading(data: &[u8], now: OffsetDateTime) -> Option<MeasurementRecord> {
    let format = CurrentReadingFormat::from_len(data.len())?;

    let mut buf = data;
    let co2 = buf.get_u16_le();
    let temp_raw = buf.get_i16_le();
    let pressure_raw = buf.get_u16_le();
    let humidity = buf.get_u8();

    let age = match format {
        CurrentReadingFormat::Full => {
            let mut tail = &data[11..13];
            Duration::seconds(i64::from(tail.get_u16_le()))
        }
        CurrentReadingFormat::LegacyMinutes => {
            let interval_minutes = i64::from(data[9]);
            let age_minutes = i64::from(data[10]);
            Duration::seconds(age_minutes * interval_minutes * 60)
        }
        CurrentReadingFormat::Basic => Duration::ZERO,
    };

    Some(MeasurementRecord::new(
        now - age,
        co2,
        raw_to_temperature(temp_raw),
        f32::from(humidity),
        raw_to_pressure(pressure_raw),
    ))
}

/// [`decode_current_reading`] against the wall clock.
#[must_use]
pub fn decode_current_reading_now(data: &[u8]) -> Option<MeasurementRecord> {
    decode_current_reading(data, OffsetDateTime::now_utc())
}

/// Decode the packed entries of one history chunk.
///
/// Entry `i` is stamped `chunk_start + i * interval_seconds`. A payload whose
/// length matches neither stride yields an empty list.
#[must_use]
pub fn decode_history_chunk(
    data: &[u8],
    chunk_start: OffsetDateTime,
    interval_seconds: u32,
) -> Vec<MeasurementRecord> {
    let Some(stride) = EntryStride::infer(data.len()) else {
        debug!(
            "History payload of {} bytes matches no known entry width, skipping",
            data.len()
        );
        return Vec::new();
    };

    let step = i64::from(interval_seconds);
    data.chunks_exact(stride.width())
        .enumerate()
        .map(|(i, entry)| {
            let mut buf = entry;
            let co2 = buf.get_u16_le();
            let temp_raw = buf.get_i16_le();
            let pressure_raw = buf.get_u16_le();
            let humidity = match stride {
                EntryStride::Seven => f32::from(buf.get_u8()),
                EntryStride::Eight => f32::from(buf.get_u16_le()) / 100.0,
            };
            let offset = Duration::seconds(i as i64 * step);

            MeasurementRecord::new(
                chunk_start + offset,
                co2,
                raw_to_temperature(temp_raw),
                humidity,
                raw_to_pressure(pressure_raw),
            )
        })
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 10:00:00 UTC);

    proptest! {
        /// Decoding arbitrary bytes must never panic.
        #[test]
        fn current_reading_never_panics(data: Vec<u8>) {
            let _ = decode_current_reading(&data, NOW);
        }

        /// Every buffer of at least 7 bytes yields a record.
        #[test]
        fn current_reading_present_from_seven_bytes(data in proptest::collection::vec(any::<u8>(), 7..64)) {
            prop_assert!(decode_current_reading(&data, NOW).is_some());
        }

        /// Anything shorter than 7 bytes yields nothing.
        #[test]
        fn current_reading_absent_below_seven_bytes(data in proptest::collection::vec(any::<u8>(), 0..7)) {
            prop_assert!(decode_current_reading(&data, NOW).is_none());
        }

        /// Record count follows the inferred stride.
        #[test]
        fn history_chunk_count_matches_stride(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let records = decode_history_chunk(&data, NOW, 60);
            match EntryStride::infer(data.len()) {
                Some(stride) => prop_assert_eq!(records.len(), data.len() / stride.width()),
                None => prop_assert!(records.is_empty()),
            }
        }
    }
}
