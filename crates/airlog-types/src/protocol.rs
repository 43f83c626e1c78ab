//! Command and framing constants for the sensor's GATT protocol.
//!
//! # History chunk framing
//!
//! Every buffer delivered on the history channel starts with a 4-byte header:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | metric selector echoed from the request |
//! | 1 | 2 | start index (1-based, little-endian) |
//! | 3 | 1 | declared record count (informational only) |
//!
//! followed by packed 7- or 8-byte entries (see [`crate::decode`]).

use bytes::{Buf, Bytes};

use crate::error::{ParseError, ParseResult};

/// History request opcode (read-based protocol).
/// Format: `[HISTORY_REQUEST, metric, start_lo, start_hi]`
pub const HISTORY_REQUEST: u8 = 0x61;

/// Metric selector asking for interleaved records (all four quantities per entry).
pub const METRIC_ALL: u8 = 0x00;

/// Size of the history chunk header in bytes.
pub const CHUNK_HEADER_LEN: usize = 4;

/// Command written to the command channel to start a backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillCommand {
    /// Opcode byte.
    pub opcode: u8,
    /// Metric selector byte.
    pub metric: u8,
    /// 1-based index of the first record requested.
    pub start_index: u16,
}

impl BackfillCommand {
    /// A request for every stored record starting at the oldest one.
    #[must_use]
    pub fn from_start(metric: u8) -> Self {
        Self {
            opcode: HISTORY_REQUEST,
            metric,
            start_index: 1,
        }
    }

    /// Encode as `[opcode, metric, start_lo, start_hi]`.
    ///
    /// ```
    /// use airlog_types::protocol::BackfillCommand;
    ///
    /// assert_eq!(BackfillCommand::from_start(0x00).encode(), [0x61, 0x00, 0x01, 0x00]);
    /// ```
    #[must_use]
    pub fn encode(&self) -> [u8; 4] {
        let [lo, hi] = self.start_index.to_le_bytes();
        [self.opcode, self.metric, lo, hi]
    }
}

/// One buffer received on the history channel, split into header and entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryChunk {
    /// Metric selector echoed by the device.
    pub metric: u8,
    /// 1-based index of the first entry in this chunk.
    pub start_index: u16,
    /// Count claimed by the header. Not trusted: the payload length wins.
    pub declared_count: u8,
    /// Packed entries following the header.
    pub payload: Bytes,
}

impl HistoryChunk {
    /// Split a raw buffer, returning `None` when the header is incomplete.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        Self::try_parse(data).ok()
    }

    /// Like [`parse`](Self::parse) but reports why the buffer was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] when fewer than
    /// [`CHUNK_HEADER_LEN`] bytes are supplied, and
    /// [`ParseError::InvalidData`] for a zero start index.
    pub fn try_parse(data: &[u8]) -> ParseResult<Self> {
        if data.len() < CHUNK_HEADER_LEN {
            return Err(ParseError::InsufficientBytes {
                expected: CHUNK_HEADER_LEN,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let metric = buf.get_u8();
        let start_index = buf.get_u16_le();
        let declared_count = buf.get_u8();

        if start_index == 0 {
            return Err(ParseError::InvalidData(
                "history start index is 1-based, got 0".to_string(),
            ));
        }

        Ok(Self {
            metric,
            start_index,
            declared_count,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

/// Read a metadata channel value (total count, interval or age).
///
/// Values are little-endian `u16`; a lone byte is accepted for firmware that
/// reports the interval in a single byte.
#[must_use]
pub fn decode_metadata_value(data: &[u8]) -> Option<u32> {
    match data {
        [] => None,
        [b] => Some(u32::from(*b)),
        [lo, hi, ..] => Some(u32::from(u16::from_le_bytes([*lo, *hi]))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backfill_command_layout() {
        let cmd = BackfillCommand::from_start(METRIC_ALL);
        assert_eq!(cmd.encode(), [HISTORY_REQUEST, METRIC_ALL, 0x01, 0x00]);
    }

    #[test]
    fn test_backfill_command_high_start_index() {
        let cmd = BackfillCommand {
            opcode: HISTORY_REQUEST,
            metric: 4,
            start_index: 0x0203,
        };
        assert_eq!(cmd.encode(), [0x61, 4, 0x03, 0x02]);
    }

    #[test]
    fn test_chunk_parse_header_and_payload() {
        let data = [0x00, 0x05, 0x00, 2, 1, 2, 3, 4, 5, 6, 7];
        let chunk = HistoryChunk::parse(&data).unwrap();
        assert_eq!(chunk.metric, 0);
        assert_eq!(chunk.start_index, 5);
        assert_eq!(chunk.declared_count, 2);
        assert_eq!(chunk.payload.as_ref(), &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_chunk_parse_header_only() {
        let chunk = HistoryChunk::parse(&[0x00, 0x01, 0x00, 0]).unwrap();
        assert!(chunk.payload.is_empty());
    }

    #[test]
    fn test_chunk_parse_too_short() {
        assert!(HistoryChunk::parse(&[0x00, 0x01]).is_none());
        assert_eq!(
            HistoryChunk::try_parse(&[0x00]),
            Err(ParseError::InsufficientBytes {
                expected: 4,
                actual: 1
            })
        );
    }

    #[test]
    fn test_chunk_parse_zero_start_index() {
        let err = HistoryChunk::try_parse(&[0x00, 0x00, 0x00, 1]).unwrap_err();
        assert!(err.to_string().contains("1-based"));
    }

    #[test]
    fn test_metadata_value() {
        assert_eq!(decode_metadata_value(&[]), None);
        assert_eq!(decode_metadata_value(&[5]), Some(5));
        assert_eq!(decode_metadata_value(&[0x2C, 0x01]), Some(300));
        assert_eq!(decode_metadata_value(&[0xFF, 0xFF, 0x99]), Some(65535));
    }
}
