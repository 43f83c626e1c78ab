//! Shared helpers for command implementations.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Read a file, or stdin when no path (or `-`) is given.
pub fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

/// Parse a command-line timestamp. Offset-less values are UTC.
pub fn parse_datetime(s: &str) -> Result<OffsetDateTime> {
    let s = s.trim();

    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(dt);
    }

    let with_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    if let Ok(dt) = PrimitiveDateTime::parse(s, with_seconds) {
        return Ok(dt.assume_utc());
    }

    let without_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]");
    if let Ok(dt) = PrimitiveDateTime::parse(s, without_seconds) {
        return Ok(dt.assume_utc());
    }

    if let Ok(date) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }

    bail!(
        "Invalid date/time format: {}. Use RFC3339, YYYY-MM-DD HH:MM[:SS] or YYYY-MM-DD",
        s
    )
}

/// Parse an optional `--since`/`--until` pair.
pub fn parse_range(
    since: Option<&str>,
    until: Option<&str>,
) -> Result<(Option<OffsetDateTime>, Option<OffsetDateTime>)> {
    let since = since.map(parse_datetime).transpose()?;
    let until = until.map(parse_datetime).transpose()?;
    if let (Some(start), Some(end)) = (since, until)
        && start > end
    {
        bail!("--since must not be after --until");
    }
    Ok((since, until))
}

/// Decode hex bytes, ignoring whitespace, colons, dashes and a `0x` prefix.
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    hex::decode(&digits).with_context(|| format!("Invalid hex payload: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(
            parse_datetime("2024-01-02T03:04:05+01:00").unwrap(),
            datetime!(2024-01-02 02:04:05 UTC)
        );
        assert_eq!(
            parse_datetime("2024-01-02 03:04:05").unwrap(),
            datetime!(2024-01-02 03:04:05 UTC)
        );
        assert_eq!(
            parse_datetime("2024-01-02 03:04").unwrap(),
            datetime!(2024-01-02 03:04:00 UTC)
        );
        assert_eq!(
            parse_datetime("2024-01-02").unwrap(),
            datetime!(2024-01-02 00:00:00 UTC)
        );
    }

    #[test]
    fn test_parse_datetime_invalid() {
        let err = parse_datetime("last tuesday").unwrap_err().to_string();
        assert!(err.contains("Invalid date/time format"));
    }

    #[test]
    fn test_parse_range_rejects_inverted() {
        assert!(parse_range(Some("2024-01-02"), Some("2024-01-01")).is_err());
        let (since, until) = parse_range(Some("2024-01-01"), None).unwrap();
        assert!(since.is_some());
        assert!(until.is_none());
    }

    #[test]
    fn test_parse_hex_separators() {
        assert_eq!(parse_hex("0x6402AE01").unwrap(), vec![0x64, 0x02, 0xae, 0x01]);
        assert_eq!(parse_hex("64 02:ae-01").unwrap(), vec![0x64, 0x02, 0xae, 0x01]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "hello\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "hello\n");
    }
}
