//! Human-readable byte sizes ("10MB", "512 KB").

use thiserror::Error;

/// A size string that could not be turned into bytes.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid size '{input}' - expected a byte count like '10MB', '512KB' or '1GB'")]
pub struct SizeParseError {
    input: String,
}

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// Longest suffixes first so "MB" is not read as "B".
const UNITS: [(&str, u64); 7] = [
    ("GB", GB),
    ("MB", MB),
    ("KB", KB),
    ("G", GB),
    ("M", MB),
    ("K", KB),
    ("B", 1),
];

/// Parses a byte count with an optional binary unit suffix.
///
/// Case-insensitive and whitespace tolerant. Decimals are rejected.
///
/// ```
/// use deepzoom::config::parse_size;
///
/// assert_eq!(parse_size("10MB").unwrap(), 10 * 1024 * 1024);
/// assert_eq!(parse_size("512 k").unwrap(), 512 * 1024);
/// assert_eq!(parse_size("4096").unwrap(), 4096);
/// ```
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let err = || SizeParseError {
        input: input.to_string(),
    };
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (digits, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| {
            upper
                .strip_suffix(suffix)
                .map(|rest| (rest.trim_end(), *multiplier))
        })
        .unwrap_or((upper.as_str(), 1));

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    let value: u64 = digits.parse().map_err(|_| err())?;
    value.checked_mul(multiplier).ok_or_else(err)
}

/// Formats a byte count with the largest unit that divides it exactly.
///
/// ```
/// use deepzoom::config::format_size;
///
/// assert_eq!(format_size(10 * 1024 * 1024), "10MB");
/// assert_eq!(format_size(1000), "1000");
/// ```
pub fn format_size(bytes: u64) -> String {
    for (suffix, unit) in [("GB", GB), ("MB", MB), ("KB", KB)] {
        if bytes >= unit && bytes % unit == 0 {
            return format!("{}{}", bytes / unit, suffix);
        }
    }
    bytes.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("1KB").unwrap(), KB);
        assert_eq!(parse_size("1k").unwrap(), KB);
        assert_eq!(parse_size("3mb").unwrap(), 3 * MB);
        assert_eq!(parse_size("2G").unwrap(), 2 * GB);
        assert_eq!(parse_size("100B").unwrap(), 100);
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(parse_size("  10 MB ").unwrap(), 10 * MB);
    }

    #[test]
    fn test_parse_invalid() {
        for input in ["", "MB", "abc", "-1MB", "1.5GB", "2TB", "1 2MB"] {
            assert!(parse_size(input).is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn test_parse_overflow() {
        assert!(parse_size("99999999999999999GB").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(KB), "1KB");
        assert_eq!(format_size(10 * MB), "10MB");
        assert_eq!(format_size(GB + MB), "1025MB");
        assert_eq!(format_size(1000), "1000");
        assert_eq!(format_size(0), "0");
    }

    #[test]
    fn test_format_then_parse() {
        for bytes in [KB, 7 * MB, 3 * GB, 1500] {
            assert_eq!(parse_size(&format_size(bytes)).unwrap(), bytes);
        }
    }
}
