//! Decode command - inspect raw sensor payloads.

use airlog_types::decode::{EntryStride, decode_current_reading_now, decode_history_chunk};
use airlog_types::{HistoryChunk, MeasurementRecord};
use anyhow::{Context as _, Result, bail};
use time::OffsetDateTime;

use super::Context;
use crate::cli::{OutputFormat, PayloadKind};
use crate::format::{format_records_csv, format_records_json, format_records_text};
use crate::util::{parse_datetime, parse_hex, write_output};

/// Arguments for the decode command.
pub struct DecodeArgs {
    pub kind: PayloadKind,
    pub hex: String,
    pub interval: u32,
    pub start: Option<String>,
    pub format: OutputFormat,
}

/// Execute the decode command.
pub fn cmd_decode(args: DecodeArgs, ctx: &Context) -> Result<()> {
    let bytes = parse_hex(&args.hex)?;
    let start = args
        .start
        .as_deref()
        .map(parse_datetime)
        .transpose()?
        .unwrap_or_else(OffsetDateTime::now_utc);

    let mut preamble = String::new();
    let records = match args.kind {
        PayloadKind::Current => {
            let record = decode_current_reading_now(&bytes).with_context(|| {
                format!(
                    "A current reading needs at least 7 bytes, got {}",
                    bytes.len()
                )
            })?;
            vec![record]
        }
        PayloadKind::Chunk => {
            let chunk = HistoryChunk::try_parse(&bytes).context("Invalid history chunk")?;
            preamble = format!(
                "Chunk: metric {}, start index {}, {} entries declared, {} payload bytes\n",
                chunk.metric,
                chunk.start_index,
                chunk.declared_count,
                chunk.payload.len()
            );
            decode_entries(&chunk.payload, start, args.interval)?
        }
        PayloadKind::Entries => decode_entries(&bytes, start, args.interval)?,
    };

    let formatted = match args.format {
        OutputFormat::Text => preamble + &format_records_text(&records, &ctx.opts),
        OutputFormat::Json => format_records_json(&records, &ctx.opts)?,
        OutputFormat::Csv => format_records_csv(&records, &ctx.opts)?,
    };
    write_output(ctx.output.as_ref(), &formatted)
}

fn decode_entries(
    payload: &[u8],
    start: OffsetDateTime,
    interval: u32,
) -> Result<Vec<MeasurementRecord>> {
    if EntryStride::infer(payload.len()).is_none() {
        bail!(
            "{} payload bytes is not a whole number of 7- or 8-byte entries",
            payload.len()
        );
    }
    Ok(decode_history_chunk(payload, start, interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_decode_entries_rejects_odd_length() {
        let err = decode_entries(&[0u8; 9], datetime!(2024-01-01 00:00:00 UTC), 60)
            .unwrap_err()
            .to_string();
        assert!(err.contains("9 payload bytes"));
    }

    #[test]
    fn test_decode_entries_assigns_timestamps() {
        // Two 7-byte entries: 612 ppm, 21.5 C, 1012.3 hPa, 40 %
        let entry = [0x64, 0x02, 0xae, 0x01, 0x8b, 0x27, 0x28];
        let payload: Vec<u8> = entry.iter().chain(entry.iter()).copied().collect();
        let records = decode_entries(&payload, datetime!(2024-01-01 00:00:00 UTC), 300).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].co2, 612);
        assert_eq!(records[1].timestamp, datetime!(2024-01-01 00:05:00 UTC));
    }
}
