//! Output formatting utilities for text, JSON, and CSV output.

use airlog_core::FetchOutcome;
use airlog_store::{ImportReport, RecordStats, Severity, codec};
use airlog_types::MeasurementRecord;
use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::style;

const TEXT_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            ..Self::default()
        }
    }

    /// Create with no_header option for CSV output.
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }

    /// Create with compact JSON option.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

/// Timestamp in UTC for tables.
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.to_offset(time::UtcOffset::UTC)
        .format(TEXT_TIMESTAMP)
        .unwrap_or_else(|_| "Unknown".to_string())
}

// ============================================================================
// Records
// ============================================================================

#[must_use]
pub fn format_records_text(records: &[MeasurementRecord], opts: &FormatOptions) -> String {
    if records.is_empty() {
        return "No records found.\n".to_string();
    }

    let mut output = format!("Records ({}):\n\n", records.len());
    output.push_str(&format!(
        "{:<19}  {:>5}  {:>8}  {:>7}  {:>9}\n",
        "Timestamp (UTC)", "CO2", "Temp (C)", "Hum (%)", "Pres (hPa)"
    ));
    for record in records {
        let co2 = style::paint_co2(&format!("{:>5}", record.co2), record.co2, opts.no_color);
        output.push_str(&format!(
            "{:<19}  {}  {:>8.2}  {:>7.2}  {:>9.2}\n",
            format_timestamp(record.timestamp),
            co2,
            record.temperature,
            record.humidity,
            record.pressure
        ));
    }
    output
}

/// Canonical CSV, optionally without the header line.
pub fn format_records_csv(records: &[MeasurementRecord], opts: &FormatOptions) -> Result<String> {
    let text = codec::to_canonical_string(records)?;
    if !opts.no_header {
        return Ok(text);
    }
    Ok(text
        .split_once('\n')
        .map(|(_, rest)| rest.to_string())
        .unwrap_or_default())
}

pub fn format_records_json(records: &[MeasurementRecord], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct RecordJson {
        timestamp: String,
        co2: u16,
        temperature: f32,
        humidity: f32,
        pressure: f32,
    }

    let rows: Vec<RecordJson> = records
        .iter()
        .map(|r| RecordJson {
            timestamp: r.timestamp.format(&Rfc3339).unwrap_or_default(),
            co2: r.co2,
            temperature: r.temperature,
            humidity: r.humidity,
            pressure: r.pressure,
        })
        .collect();

    opts.as_json(&rows)
}

// ============================================================================
// Stats and reports
// ============================================================================

#[must_use]
pub fn format_stats_text(stats: Option<&RecordStats>, scope: &str, opts: &FormatOptions) -> String {
    let Some(stats) = stats else {
        return format!("No records for {}.\n", scope);
    };

    let mut output = format!(
        "{}\n",
        style::format_title(&format!("Statistics for {}", scope), opts.no_color)
    );
    output.push_str(&format!("  Records: {}\n", stats.count));
    output.push_str(&format!("  First:   {}\n", format_timestamp(stats.first)));
    output.push_str(&format!("  Last:    {}\n\n", format_timestamp(stats.last)));
    output.push_str(&format!(
        "  {:<12} {:>9} {:>9} {:>9}\n",
        "", "min", "avg", "max"
    ));

    let avg_co2 = stats.co2.avg.round() as u16;
    output.push_str(&format!(
        "  {:<12} {:>9.0} {:>9.0} {:>9.0}  {}\n",
        "CO2 (ppm)",
        stats.co2.min,
        stats.co2.avg,
        stats.co2.max,
        style::paint_co2(style::air_quality_summary(avg_co2), avg_co2, opts.no_color)
    ));
    for (label, field) in [
        ("Temp (C)", &stats.temperature),
        ("Hum (%)", &stats.humidity),
        ("Pres (hPa)", &stats.pressure),
    ] {
        output.push_str(&format!(
            "  {:<12} {:>9.2} {:>9.2} {:>9.2}\n",
            label, field.min, field.avg, field.max
        ));
    }
    output
}

#[must_use]
pub fn format_import_report(report: &ImportReport, show_issues: bool, opts: &FormatOptions) -> String {
    let mut output = style::format_success(
        &format!("Imported {} records", report.imported),
        opts.no_color,
    );
    output.push('\n');

    if report.errors + report.warnings > 0 {
        output.push_str(&style::format_warning(
            &format!(
                "Skipped {} rows ({} errors, {} warnings)",
                report.errors + report.warnings,
                report.errors,
                report.warnings
            ),
            opts.no_color,
        ));
        output.push('\n');
    }

    if show_issues {
        for issue in &report.issues {
            let line = format!("line {}: {}", issue.line, issue.message);
            let line = match issue.severity {
                Severity::Error => style::format_error(&line, opts.no_color),
                Severity::Warning => style::format_warning(&line, opts.no_color),
            };
            output.push_str("  ");
            output.push_str(&line);
            output.push('\n');
        }
    }
    output
}

#[must_use]
pub fn describe_outcome(outcome: &FetchOutcome) -> String {
    match outcome {
        FetchOutcome::Complete { received } => {
            format!("backfill complete, {} records received", received)
        }
        FetchOutcome::Incomplete { received, expected } => {
            format!(
                "backfill timed out after {} of {} records",
                received, expected
            )
        }
        FetchOutcome::Cancelled { received, expected } => {
            format!(
                "backfill cancelled after {} of {} records",
                received, expected
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airlog_store::RowIssue;
    use time::macros::datetime;

    fn sample() -> Vec<MeasurementRecord> {
        vec![
            MeasurementRecord::new(datetime!(2024-01-02 03:04:05 UTC), 612, 21.5, 40.0, 1012.3),
            MeasurementRecord::new(datetime!(2024-01-02 03:09:05 UTC), 1650, 22.0, 41.0, 1012.1),
        ]
    }

    #[test]
    fn test_records_text_plain() {
        let text = format_records_text(&sample(), &FormatOptions::new(true));
        assert!(text.starts_with("Records (2):"));
        assert!(text.contains("2024-01-02 03:04:05    612     21.50"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_records_text_empty() {
        assert_eq!(
            format_records_text(&[], &FormatOptions::default()),
            "No records found.\n"
        );
    }

    #[test]
    fn test_records_csv_no_header() {
        let opts = FormatOptions::default().with_no_header(true);
        let csv = format_records_csv(&sample(), &opts).unwrap();
        assert!(csv.starts_with("2024-01-02T03:04:05.000Z,612,"));
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_records_json_compact() {
        let opts = FormatOptions::default().with_compact(true);
        let json = format_records_json(&sample()[..1], &opts).unwrap();
        assert_eq!(
            json,
            "[{\"timestamp\":\"2024-01-02T03:04:05Z\",\"co2\":612,\"temperature\":21.5,\"humidity\":40.0,\"pressure\":1012.3}]\n"
        );
    }

    #[test]
    fn test_stats_text() {
        let records = sample();
        let stats = RecordStats::compute(&records);
        let text = format_stats_text(stats.as_ref(), "all devices", &FormatOptions::new(true));
        assert!(text.contains("Records: 2"));
        assert!(text.contains("Poor"));
        assert_eq!(
            format_stats_text(None, "kitchen", &FormatOptions::new(true)),
            "No records for kitchen.\n"
        );
    }

    #[test]
    fn test_import_report_issues() {
        let report = ImportReport {
            imported: 4,
            errors: 1,
            warnings: 1,
            issues: vec![
                RowIssue {
                    line: 3,
                    severity: Severity::Error,
                    message: "unparseable date 'x'".into(),
                },
                RowIssue {
                    line: 5,
                    severity: Severity::Warning,
                    message: "missing co2".into(),
                },
            ],
        };
        let text = format_import_report(&report, true, &FormatOptions::new(true));
        assert!(text.contains("[OK] Imported 4 records"));
        assert!(text.contains("Skipped 2 rows (1 errors, 1 warnings)"));
        assert!(text.contains("[XX] line 3: unparseable date 'x'"));
        assert!(text.contains("[!!] line 5: missing co2"));
    }

    #[test]
    fn test_describe_outcome() {
        assert_eq!(
            describe_outcome(&FetchOutcome::Incomplete {
                received: 20,
                expected: 48
            }),
            "backfill timed out after 20 of 48 records"
        );
    }
}
