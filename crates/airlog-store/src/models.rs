//! Report and summary types returned by the store.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use airlog_types::MeasurementRecord;

/// How bad a rejected row was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Missing or unparseable date; the row is skipped.
    Error,
    /// Missing or unparseable measurement; the row is skipped.
    Warning,
}

/// One row the CSV parser rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    /// 1-based line number in the input.
    pub line: u64,
    /// Error or warning.
    pub severity: Severity,
    /// What was wrong.
    pub message: String,
}

/// Result of importing CSV text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Rows turned into records and merged.
    pub imported: usize,
    /// Rows rejected for their date.
    pub errors: usize,
    /// Rows rejected for a measurement.
    pub warnings: usize,
    /// Details for every rejected row.
    pub issues: Vec<RowIssue>,
}

/// Min/max/mean of one measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl FieldStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (count > 0).then(|| Self {
            min,
            max,
            avg: sum / count as f64,
        })
    }
}

/// Summary of a set of records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecordStats {
    /// Number of records.
    pub count: usize,
    /// Oldest timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub first: OffsetDateTime,
    /// Newest timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub last: OffsetDateTime,
    pub co2: FieldStats,
    pub temperature: FieldStats,
    pub humidity: FieldStats,
    pub pressure: FieldStats,
}

impl RecordStats {
    /// Summarize records, `None` when there are none.
    pub fn compute<'a>(records: impl IntoIterator<Item = &'a MeasurementRecord>) -> Option<Self> {
        let records: Vec<&MeasurementRecord> = records.into_iter().collect();
        let first = records.iter().map(|r| r.timestamp).min()?;
        let last = records.iter().map(|r| r.timestamp).max()?;

        Some(Self {
            count: records.len(),
            first,
            last,
            co2: FieldStats::from_values(records.iter().map(|r| f64::from(r.co2)))?,
            temperature: FieldStats::from_values(records.iter().map(|r| f64::from(r.temperature)))?,
            humidity: FieldStats::from_values(records.iter().map(|r| f64::from(r.humidity)))?,
            pressure: FieldStats::from_values(records.iter().map(|r| f64::from(r.pressure)))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_stats_empty() {
        assert!(RecordStats::compute(&Vec::<MeasurementRecord>::new()).is_none());
    }

    #[test]
    fn test_stats_values() {
        let records = [
            MeasurementRecord::new(datetime!(2024-01-01 00:10:00 UTC), 600, 20.0, 40.0, 1000.0),
            MeasurementRecord::new(datetime!(2024-01-01 00:00:00 UTC), 400, 22.0, 50.0, 1010.0),
        ];
        let stats = RecordStats::compute(&records).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.first, datetime!(2024-01-01 00:00:00 UTC));
        assert_eq!(stats.last, datetime!(2024-01-01 00:10:00 UTC));
        assert_eq!(stats.co2.min, 400.0);
        assert_eq!(stats.co2.max, 600.0);
        assert_eq!(stats.co2.avg, 500.0);
        assert_eq!(stats.humidity.avg, 45.0);
    }

    #[test]
    fn test_import_report_json() {
        let report = ImportReport {
            imported: 3,
            errors: 1,
            warnings: 0,
            issues: vec![RowIssue {
                line: 4,
                severity: Severity::Error,
                message: "missing date".into(),
            }],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""severity":"error""#));
    }
}
