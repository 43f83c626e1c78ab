//! Visual styling utilities for the CLI.

use owo_colors::OwoColorize;

/// CO2 thresholds (ppm) based on indoor air quality guidelines.
pub mod co2 {
    pub const GOOD: u16 = 800; // Green: < 800 ppm
    pub const MODERATE: u16 = 1000; // Yellow: 800-1000 ppm
    pub const POOR: u16 = 1500; // Orange: 1000-1500 ppm
    // Red: > 1500 ppm
}

/// Color already-formatted text according to a CO2 level.
///
/// Padding is applied by the caller so escape codes do not skew columns.
pub fn paint_co2(text: &str, ppm: u16, no_color: bool) -> String {
    if no_color {
        return text.to_string();
    }

    if ppm < co2::GOOD {
        format!("{}", text.green())
    } else if ppm < co2::MODERATE {
        format!("{}", text.yellow())
    } else if ppm < co2::POOR {
        // Orange color (RGB: 255, 165, 0)
        format!("{}", text.truecolor(255, 165, 0))
    } else {
        format!("{}", text.red())
    }
}

/// Format CO2 value with appropriate color based on thresholds.
pub fn format_co2_colored(ppm: u16, no_color: bool) -> String {
    paint_co2(&ppm.to_string(), ppm, no_color)
}

/// Short air quality label for a CO2 level.
pub fn air_quality_summary(ppm: u16) -> &'static str {
    if ppm < co2::GOOD {
        "Good"
    } else if ppm < co2::MODERATE {
        "Moderate"
    } else if ppm < co2::POOR {
        "Poor"
    } else {
        "Bad"
    }
}

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

/// Format an error message.
pub fn format_error(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[XX] {}", message)
    } else {
        format!("{} {}", "[XX]".red(), message)
    }
}

/// Format a section title.
pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        title.to_string()
    } else {
        format!("{}", title.bold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_color_is_plain() {
        assert_eq!(format_co2_colored(612, true), "612");
        assert_eq!(paint_co2("  612", 612, true), "  612");
        assert_eq!(format_success("done", true), "[OK] done");
        assert_eq!(format_warning("careful", true), "[!!] careful");
        assert_eq!(format_error("failed", true), "[XX] failed");
    }

    #[test]
    fn test_colored_output_wraps_text() {
        let colored = format_co2_colored(612, false);
        assert!(colored.contains("612"));
        assert!(colored.contains('\x1b'));
    }

    #[test]
    fn test_air_quality_thresholds() {
        assert_eq!(air_quality_summary(799), "Good");
        assert_eq!(air_quality_summary(800), "Moderate");
        assert_eq!(air_quality_summary(1000), "Poor");
        assert_eq!(air_quality_summary(1500), "Bad");
    }
}
