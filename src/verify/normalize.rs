//! Base-independent comparison of values read from different sources.
//!
//! The same bitmask appears as `0xfffd7fff` on the kernel command line and
//! as `4294803455` in sysfs. Boolean module parameters read back as `Y`/`N`.

/// Parse an integer written in decimal, `0x` hexadecimal or `0o` octal,
/// with an optional sign.
///
/// # Examples
///
/// ```
/// use syscfg::verify::normalize::parse_int;
///
/// assert_eq!(parse_int("0xfffd7fff"), Some(4_294_803_455));
/// assert_eq!(parse_int("0o755"), Some(493));
/// assert_eq!(parse_int("-1"), Some(-1));
/// assert_eq!(parse_int("auto"), None);
/// ```
#[must_use]
pub fn parse_int(text: &str) -> Option<i128> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let lower = digits.to_ascii_lowercase();
    let magnitude = if let Some(hex) = lower.strip_prefix("0x") {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i128::from_str_radix(oct, 8).ok()?
    } else if !lower.is_empty() && lower.bytes().all(|b| b.is_ascii_digit()) {
        lower.parse().ok()?
    } else {
        return None;
    };
    Some(if negative { -magnitude } else { magnitude })
}

/// Canonical form of a value for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Any integer spelling, or a `Y`/`N` boolean.
    Int(i128),
    /// Anything else, trimmed.
    Text(String),
}

/// Normalize one value.
#[must_use]
pub fn normalize(value: &str) -> Normalized {
    let trimmed = value.trim();
    if let Some(n) = parse_int(trimmed) {
        return Normalized::Int(n);
    }
    match trimmed {
        "Y" | "y" => Normalized::Int(1),
        "N" | "n" => Normalized::Int(0),
        _ => Normalized::Text(trimmed.to_string()),
    }
}

/// Whether `expected` and `observed` denote the same value.
///
/// # Examples
///
/// ```
/// use syscfg::verify::normalize::values_equal;
///
/// assert!(values_equal("0xfffd7fff", "4294803455"));
/// assert!(values_equal("0", "N"));
/// assert!(!values_equal("active", "passive"));
/// ```
#[must_use]
pub fn values_equal(expected: &str, observed: &str) -> bool {
    normalize(expected) == normalize(observed)
}
