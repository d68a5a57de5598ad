//! SCPI command formatting and response parsing for the 33120A dialect.
//!
//! Everything the channel puts on the wire is an ASCII line; everything the
//! device answers is one line back. This module owns the numeric formatting
//! rules, the `SYST:ERR?` response grammar, and the waveform-catalog grammar
//! so the rest of the crate never touches raw response text.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// The `+0,"No error"` sentinel code.
pub const NO_ERROR_CODE: i32 = 0;

/// Inclusive bounds of the arb-memory error-code family (`+780`–`+787`).
/// The exact trigger codes for recovery are tunable via [`crate::Config`];
/// these are the observed defaults.
pub const MEMORY_ERROR_LO: i32 = 780;
pub const MEMORY_ERROR_HI: i32 = 787;

/// Built-in analytic shapes that always appear in the waveform catalog.
pub const BUILTIN_SHAPES: &[&str] = &["SIN", "SQU", "TRI", "RAMP", "NOIS", "DC"];

/// Built-in arb waveforms shipped in non-volatile memory. These can never be
/// deleted and are skipped by the eviction policy.
pub const BUILTIN_ARBS: &[&str] = &["SINC", "NEG_RAMP", "EXP_RISE", "EXP_FALL", "CARDIAC"];

/// An error reported by the instrument over `SYST:ERR?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    pub code: i32,
    pub message: String,
}

impl DeviceError {
    /// Whether this error belongs to the arb-memory family.
    pub fn is_memory_error(&self) -> bool {
        (MEMORY_ERROR_LO..=MEMORY_ERROR_HI).contains(&self.code.abs())
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},\"{}\"", self.code, self.message)
    }
}

/// Format a floating-point value for transmission.
///
/// The wire protocol requires `.` as the decimal separator; Rust's `format!`
/// never applies host locale, so six fixed decimals is all that is needed.
pub fn format_value(value: f64) -> String {
    format!("{:.6}", value)
}

/// Phase values go out with three decimals (device resolution is 0.001 deg).
pub fn format_phase(value: f64) -> String {
    format!("{:.3}", value)
}

/// Parse one `SYST:ERR?` response line.
///
/// Returns `None` for the no-error sentinel and for text that does not match
/// the `<signed code>,"<description>"` grammar (callers log the raw line).
pub fn parse_error_response(raw: &str) -> Option<DeviceError> {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"^\s*([+-]?\d+)\s*,\s*"?([^"]*)"?\s*$"#).unwrap());
    let caps = RE.captures(raw.trim())?;
    let code: i32 = caps[1].parse().ok()?;
    if code == NO_ERROR_CODE {
        return None;
    }
    Some(DeviceError {
        code,
        message: caps[2].trim().to_string(),
    })
}

/// Parse a `DATA:CATalog?` / `DATA:NVOLatile:CATalog?` response into names.
///
/// The device answers a comma-separated list of quoted names; an empty
/// response (`""`) means an empty catalog.
pub fn parse_catalog(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Whether `name` is reserved by the device: a built-in shape, a built-in
/// arb, the volatile staging area, or the USER alias.
pub fn is_builtin_waveform(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper == "VOLATILE"
        || upper == "USER"
        || BUILTIN_SHAPES.iter().any(|s| *s == upper)
        || BUILTIN_ARBS.iter().any(|s| *s == upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_uses_dot_and_six_decimals() {
        assert_eq!(format_value(1000.0), "1000.000000");
        assert_eq!(format_value(-0.5), "-0.500000");
        assert!(!format_value(1234.5678).contains(','));
    }

    #[test]
    fn format_phase_three_decimals() {
        assert_eq!(format_phase(359.999), "359.999");
        assert_eq!(format_phase(0.0), "0.000");
    }

    #[test]
    fn parse_no_error_sentinel() {
        assert_eq!(parse_error_response("+0,\"No error\""), None);
        assert_eq!(parse_error_response("0, \"No error\""), None);
    }

    #[test]
    fn parse_real_errors() {
        let err = parse_error_response("-222,\"Data out of range\"").unwrap();
        assert_eq!(err.code, -222);
        assert_eq!(err.message, "Data out of range");
        assert!(!err.is_memory_error());

        let err = parse_error_response("+781,\"Not enough memory\"").unwrap();
        assert_eq!(err.code, 781);
        assert!(err.is_memory_error());
    }

    #[test]
    fn parse_garbage_is_none() {
        assert_eq!(parse_error_response(""), None);
        assert_eq!(parse_error_response("garbled"), None);
    }

    #[test]
    fn parse_catalog_strips_quotes() {
        assert_eq!(
            parse_catalog("\"SINC\",\"NEG_RAMP\",\"MYARB\""),
            vec!["SINC", "NEG_RAMP", "MYARB"]
        );
        assert!(parse_catalog("\"\"").is_empty());
        assert!(parse_catalog("").is_empty());
    }

    #[test]
    fn builtin_names() {
        assert!(is_builtin_waveform("SINC"));
        assert!(is_builtin_waveform("volatile"));
        assert!(is_builtin_waveform("USER"));
        assert!(is_builtin_waveform("SIN"));
        assert!(!is_builtin_waveform("MYARB"));
    }
}
