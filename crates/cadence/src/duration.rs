//! Human duration strings: `1h30m25s` in, `1h30m` out.

use std::time::Duration;

use thiserror::Error;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Fraction digits beyond this are ignored.
const MAX_FRACTION_DIGITS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("empty duration")]
    Empty,

    #[error("negative duration: {0:?}")]
    Negative(String),

    #[error("invalid number in duration: {0:?}")]
    InvalidNumber(String),

    #[error("missing unit in duration: {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3600 * NANOS_PER_SEC,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a duration like `1h30m25s`, `90m`, `1.5h` or `250ms`.
///
/// Spaces anywhere are ignored. A bare `0` is zero; every other number needs
/// a unit.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let mut rest = compact.as_str();

    if let Some(stripped) = rest.strip_prefix('-') {
        if stripped.is_empty() {
            return Err(DurationParseError::InvalidNumber(input.to_string()));
        }
        return Err(DurationParseError::Negative(input.to_string()));
    }
    rest = rest.strip_prefix('+').unwrap_or(rest);

    if rest.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, after_int) = rest.split_at(int_len);

        let (frac_part, after_number) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after_dot.len());
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationParseError::InvalidNumber(input.to_string()));
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remainder) = after_number.split_at(unit_len);

        if unit.is_empty() {
            return Err(DurationParseError::MissingUnit(input.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| DurationParseError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let overflow = || DurationParseError::Overflow(input.to_string());

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };

        let frac_digits = &frac_part[..frac_part.len().min(MAX_FRACTION_DIGITS as usize)];
        let fraction = if frac_digits.is_empty() {
            0
        } else {
            let numerator: u128 = frac_digits.parse().map_err(|_| overflow())?;
            numerator * scale / 10u128.pow(frac_digits.len() as u32)
        };

        total = whole
            .checked_mul(scale)
            .and_then(|n| n.checked_add(fraction))
            .and_then(|n| n.checked_add(total))
            .ok_or_else(overflow)?;

        rest = remainder;
    }

    let nanos = u64::try_from(total).map_err(|_| DurationParseError::Overflow(input.to_string()))?;
    Ok(Duration::from_nanos(nanos))
}

/// Format a duration in whole seconds, dropping zero components.
pub fn format_short(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    if out.is_empty() {
        out.push_str("0s");
    }
    out
}
