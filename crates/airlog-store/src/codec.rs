//! Canonical CSV format and the tolerant import parser.
//!
//! # Canonical format
//!
//! ```text
//! date,co2,temperature,humidity,pressure
//! 2024-01-02T03:04:05.000Z,612,21.50,40.00,1012.30
//! ```
//!
//! UTF-8, LF line endings, records sorted ascending, ISO-8601 UTC timestamps
//! with milliseconds, bare integer CO2 and two decimals for the floats.
//!
//! # Import
//!
//! [`parse`] accepts the canonical format and the exports of vendor apps in
//! English or French, comma/semicolon/tab separated, with unit hints in the
//! header (`°F`, `kPa`, `Pa`, `%`). Bad rows are counted and skipped; nothing
//! aborts an import.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use tempfile::NamedTempFile;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::debug;

use airlog_types::MeasurementRecord;

use crate::error::{Error, Result};
use crate::models::{RowIssue, Severity};

/// Header line of the canonical format.
pub const CANONICAL_HEADER: [&str; 5] = ["date", "co2", "temperature", "humidity", "pressure"];

const CANONICAL_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// Patterns tried after RFC 3339, interpreted as UTC.
const UTC_PATTERNS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
    format_description!("[year]/[month]/[day] [hour]:[minute]:[second]"),
    format_description!("[year]/[month]/[day] [hour]:[minute]"),
];

const UTC_DATE_PATTERNS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]"),
    format_description!("[year]/[month]/[day]"),
];

/// Day-first patterns, interpreted in the local time zone.
const LOCAL_PATTERNS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!(
        "[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]:[second]"
    ),
    format_description!("[day padding:none]/[month padding:none]/[year] [hour padding:none]:[minute]"),
    format_description!(
        "[day padding:none]/[month padding:none]/[year] [hour repr:12 padding:none]:[minute]:[second] [period case_sensitive:false]"
    ),
    format_description!(
        "[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]:[second]"
    ),
    format_description!("[day padding:none].[month padding:none].[year] [hour padding:none]:[minute]"),
    format_description!(
        "[day padding:none]-[month padding:none]-[year] [hour padding:none]:[minute]:[second]"
    ),
];

const LOCAL_DATE_PATTERNS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[day padding:none]/[month padding:none]/[year]"),
    format_description!("[day padding:none].[month padding:none].[year]"),
];

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// Unhinted pressures below this are kPa.
const KPA_HEURISTIC_LIMIT: f64 = 20.0;

/// Records and rejected-row counters from one parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCsv {
    /// Rows that became records, in input order.
    pub records: Vec<MeasurementRecord>,
    /// Rows skipped for a missing or unparseable date.
    pub errors: usize,
    /// Rows skipped for a missing or unparseable measurement.
    pub warnings: usize,
    /// One entry per skipped row.
    pub issues: Vec<RowIssue>,
}

impl ParsedCsv {
    fn reject(&mut self, line: u64, severity: Severity, message: String) {
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        self.issues.push(RowIssue {
            line,
            severity,
            message,
        });
    }
}

// --- export ---

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
    Ok(ts.to_offset(UtcOffset::UTC).format(CANONICAL_TIMESTAMP)?)
}

fn write_canonical<W: Write>(records: &[MeasurementRecord], out: W) -> Result<W> {
    let mut sorted: Vec<&MeasurementRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);
    writer.write_record(CANONICAL_HEADER)?;
    for record in sorted {
        writer.write_record([
            format_timestamp(record.timestamp)?,
            record.co2.to_string(),
            format!("{:.2}", record.temperature),
            format!("{:.2}", record.humidity),
            format!("{:.2}", record.pressure),
        ])?;
    }
    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}

/// Render records in the canonical format.
///
/// # Errors
///
/// Fails only for timestamps the canonical format cannot represent.
pub fn to_canonical_string(records: &[MeasurementRecord]) -> Result<String> {
    let bytes = write_canonical(records, Vec::new())?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// Write records to `destination` in the canonical format.
///
/// The text goes to a temporary file in the destination directory which then
/// replaces the target, so readers never see a partial file.
///
/// # Errors
///
/// Returns an error when the directory cannot be created or the file cannot
/// be written or moved into place.
pub fn export(records: &[MeasurementRecord], destination: &Path) -> Result<()> {
    replace_file(destination, |file| {
        write_canonical(records, file)?.flush()?;
        Ok(())
    })?;
    debug!(
        "Wrote {} records to {}",
        records.len(),
        destination.display()
    );
    Ok(())
}

/// Write through a temporary file in the destination directory, then move it
/// over `destination`.
pub(crate) fn replace_file(
    destination: &Path,
    write: impl FnOnce(&mut File) -> Result<()>,
) -> Result<()> {
    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| Error::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
    }

    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.persist(destination)?;
    Ok(())
}

// --- import ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Date,
    Co2,
    Temperature,
    Humidity,
    Pressure,
}

impl Field {
    const ALL: [Self; 5] = [
        Self::Date,
        Self::Co2,
        Self::Temperature,
        Self::Humidity,
        Self::Pressure,
    ];

    /// Normalized header prefixes, English then French.
    fn synonyms(self) -> &'static [&'static str] {
        match self {
            Self::Date => &[
                "date",
                "datetime",
                "timestamp",
                "time",
                "heure",
                "horodatage",
            ],
            Self::Co2 => &["co2", "carbondioxide", "dioxydedecarbone", "dioxyde"],
            Self::Temperature => &["temperature", "temp"],
            Self::Humidity => &["humidity", "relativehumidity", "humidite"],
            Self::Pressure => &[
                "pressure",
                "atmosphericpressure",
                "barometric",
                "pression",
            ],
        }
    }

    fn name(self) -> &'static str {
        CANONICAL_HEADER[self as usize]
    }

    fn matches(self, token: &str) -> bool {
        self.synonyms().iter().any(|s| token.starts_with(s))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum PressureUnit {
    #[default]
    Unspecified,
    Hectopascal,
    Kilopascal,
    Pascal,
}

/// Column positions and unit hints resolved from the header row.
#[derive(Debug, Clone, Default)]
struct ColumnMap {
    columns: [Option<usize>; 5],
    recognized: usize,
    fahrenheit: bool,
    humidity_percent: bool,
    pressure: PressureUnit,
}

impl ColumnMap {
    fn resolve(header: &StringRecord) -> Self {
        let mut columns = [None; 5];
        for (index, raw) in header.iter().enumerate() {
            let token = normalize_header(raw);
            if token.is_empty() {
                continue;
            }
            let field = Field::ALL
                .into_iter()
                .find(|f| columns[*f as usize].is_none() && f.matches(&token));
            if let Some(field) = field {
                columns[field as usize] = Some(index);
            }
        }

        let recognized = columns.iter().flatten().count();
        if recognized < Field::ALL.len() && header.len() == Field::ALL.len() {
            debug!(recognized, "Header not fully recognized, using column order");
            columns = [Some(0), Some(1), Some(2), Some(3), Some(4)];
        }

        let hint = |field: Field| {
            columns[field as usize]
                .and_then(|i| header.get(i))
                .unwrap_or_default()
        };

        let temperature = unit_tokens(hint(Field::Temperature));
        let pressure = unit_tokens(hint(Field::Pressure));
        let humidity = hint(Field::Humidity);

        Self {
            columns,
            recognized,
            fahrenheit: temperature.iter().any(|t| t == "f" || t == "fahrenheit"),
            humidity_percent: humidity.contains('%')
                || unit_tokens(humidity).iter().any(|t| t == "percent"),
            pressure: if pressure.iter().any(|t| t == "kpa") {
                PressureUnit::Kilopascal
            } else if pressure.iter().any(|t| t == "hpa" || t == "mbar") {
                PressureUnit::Hectopascal
            } else if pressure.iter().any(|t| t == "pa") {
                PressureUnit::Pascal
            } else {
                PressureUnit::Unspecified
            },
        }
    }

    fn cell<'r>(&self, row: &'r StringRecord, field: Field) -> Option<&'r str> {
        self.columns[field as usize]
            .and_then(|i| row.get(i))
            .filter(|s| !s.is_empty())
    }

    fn number(&self, row: &StringRecord, field: Field) -> std::result::Result<f64, String> {
        let cell = self
            .cell(row, field)
            .ok_or_else(|| format!("missing {}", field.name()))?;
        parse_number(cell).ok_or_else(|| format!("unparseable {} '{}'", field.name(), cell))
    }

    fn record(
        &self,
        row: &StringRecord,
        local: UtcOffset,
    ) -> std::result::Result<MeasurementRecord, (Severity, String)> {
        let date = self
            .cell(row, Field::Date)
            .ok_or_else(|| (Severity::Error, "missing date".to_string()))?;
        let timestamp = parse_date(date, local)
            .ok_or_else(|| (Severity::Error, format!("unparseable date '{date}'")))?;

        let warn = |message| (Severity::Warning, message);
        let co2 = self.number(row, Field::Co2).map_err(warn)?;
        let temperature = self.number(row, Field::Temperature).map_err(warn)?;
        let humidity = self.number(row, Field::Humidity).map_err(warn)?;
        let pressure = self.number(row, Field::Pressure).map_err(warn)?;

        let co2 = co2.round();
        if !(0.0..=f64::from(u16::MAX)).contains(&co2) {
            return Err(warn(format!("co2 out of range '{co2}'")));
        }

        let temperature = if self.fahrenheit {
            (temperature - 32.0) * 5.0 / 9.0
        } else {
            temperature
        };
        let humidity = if !self.humidity_percent && (0.0..=1.0).contains(&humidity) {
            humidity * 100.0
        } else {
            humidity
        };
        let pressure = match self.pressure {
            PressureUnit::Kilopascal => pressure * 10.0,
            PressureUnit::Pascal => pressure / 100.0,
            PressureUnit::Hectopascal => pressure,
            PressureUnit::Unspecified if pressure < KPA_HEURISTIC_LIMIT => pressure * 10.0,
            PressureUnit::Unspecified => pressure,
        };

        Ok(MeasurementRecord::new(
            timestamp,
            co2 as u16,
            temperature as f32,
            humidity as f32,
            pressure as f32,
        ))
    }
}

/// Fold a header cell to lowercase ASCII letters and digits.
///
/// ```
/// use airlog_store::codec::normalize_header;
///
/// assert_eq!(normalize_header("Température(°C)"), "temperaturec");
/// assert_eq!(normalize_header("Dioxyde de carbone (ppm)"), "dioxydedecarboneppm");
/// ```
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'æ' => out.push_str("ae"),
            'ç' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ñ' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => out.push('o'),
            'œ' => out.push_str("oe"),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'ß' => out.push_str("ss"),
            '₂' => out.push('2'),
            c if c.is_ascii_alphanumeric() => out.push(c),
            _ => {}
        }
    }
    out
}

fn unit_tokens(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a number, accepting a comma as decimal separator.
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse a timestamp cell.
///
/// Tried in order: epoch seconds (milliseconds above 1e11), RFC 3339, a fixed
/// list of year-first patterns taken as UTC, then day-first patterns taken in
/// the `local` offset.
pub fn parse_date(raw: &str, local: UtcOffset) -> Option<OffsetDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    parse_epoch(s)
        .or_else(|| OffsetDateTime::parse(s, &Rfc3339).ok())
        .or_else(|| parse_patterns(s, UTC_PATTERNS, UTC_DATE_PATTERNS, UtcOffset::UTC))
        .or_else(|| parse_patterns(s, LOCAL_PATTERNS, LOCAL_DATE_PATTERNS, local))
}

fn parse_epoch(s: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = s.parse::<i64>() {
        let value = i128::from(value);
        let nanos = if value.abs() > EPOCH_MILLIS_THRESHOLD as i128 {
            value * 1_000_000
        } else {
            value * 1_000_000_000
        };
        return OffsetDateTime::from_unix_timestamp_nanos(nanos).ok();
    }
    let value = s.parse::<f64>().ok().filter(|v| v.is_finite())?;
    let nanos = if value.abs() > EPOCH_MILLIS_THRESHOLD {
        value * 1e6
    } else {
        value * 1e9
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos as i128).ok()
}

fn parse_patterns(
    s: &str,
    datetimes: &[&[BorrowedFormatItem<'static>]],
    dates: &[&[BorrowedFormatItem<'static>]],
    offset: UtcOffset,
) -> Option<OffsetDateTime> {
    datetimes
        .iter()
        .find_map(|fmt| PrimitiveDateTime::parse(s, fmt).ok())
        .or_else(|| {
            dates
                .iter()
                .find_map(|fmt| Date::parse(s, fmt).ok())
                .map(Date::midnight)
        })
        .map(|dt| dt.assume_offset(offset))
}

/// Pick the delimiter occurring most often, comma on ties or when none occur.
fn detect_delimiter(header: &str, first_data: Option<&str>) -> u8 {
    fn most_frequent(line: &str) -> Option<u8> {
        let mut best: Option<(u8, usize)> = None;
        for delimiter in [b',', b';', b'\t'] {
            let count = line.bytes().filter(|b| *b == delimiter).count();
            if count > 0 && best.is_none_or(|(_, n)| count > n) {
                best = Some((delimiter, count));
            }
        }
        best.map(|(d, _)| d)
    }
    most_frequent(header)
        .or_else(|| first_data.and_then(most_frequent))
        .unwrap_or(b',')
}

/// The offset day-first dates are read in.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Parse CSV text, reading day-first dates in the local time zone.
pub fn parse(text: &str) -> ParsedCsv {
    parse_with_offset(text, local_offset())
}

/// Parse CSV text, reading day-first dates at a fixed offset.
pub fn parse_with_offset(text: &str, local: UtcOffset) -> ParsedCsv {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(header_line) = lines.next() else {
        return ParsedCsv::default();
    };
    let delimiter = detect_delimiter(header_line, lines.next());

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut parsed = ParsedCsv::default();
    let mut columns: Option<ColumnMap> = None;

    for result in reader.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                parsed.reject(line, Severity::Error, format!("malformed row: {e}"));
                continue;
            }
        };
        if row.iter().all(str::is_empty) {
            continue;
        }
        let line = row.position().map_or(0, |p| p.line());

        let map = match columns.take() {
            Some(map) => map,
            None => {
                let map = ColumnMap::resolve(&row);
                let headerless = map.recognized == 0
                    && row.get(0).and_then(|c| parse_date(c, local)).is_some();
                if !headerless {
                    columns = Some(map);
                    continue;
                }
                debug!("First row holds data, no header present");
                map
            }
        };

        match map.record(&row, local) {
            Ok(record) => parsed.records.push(record),
            Err((severity, message)) => parsed.reject(line, severity, message),
        }
        columns = Some(map);
    }

    debug!(
        records = parsed.records.len(),
        errors = parsed.errors,
        warnings = parsed.warnings,
        delimiter = %char::from(delimiter).escape_default(),
        "Parsed CSV"
    );
    parsed
}
