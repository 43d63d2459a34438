//! Conversion between `HH:MM:SS,mmm` timestamps and millisecond offsets.

use crate::error::TranscriptError;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Decodes `HH:MM:SS[,.]mmm` or `MM:SS[,.]mmm` into milliseconds.
///
/// The fractional part is right-padded or truncated to exactly three digits,
/// so `00:00:01.5` is 1500 ms and `00:00:01,23456` is 1234 ms. An empty
/// fraction (`00:00:01,`) reads as zero. Clock fields must be non-empty runs
/// of ASCII digits.
///
/// # Errors
///
/// Returns `TranscriptError::MalformedTimestamp` when a field is not numeric,
/// the colon-separated field count is neither 2 nor 3, or the value overflows.
pub fn parse_timestamp(text: &str) -> Result<u64, TranscriptError> {
    let trimmed = text.trim();
    let malformed = || TranscriptError::MalformedTimestamp {
        value: text.to_owned(),
        block: None,
    };

    let mut parts = trimmed.split([',', '.']);
    let clock = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or("0");

    let fields = clock
        .split(':')
        .map(parse_digits)
        .collect::<Option<Vec<u64>>>()
        .ok_or_else(malformed)?;

    let (hours, minutes, seconds) = match fields.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return Err(malformed()),
    };

    let millis = parse_fraction(fraction).ok_or_else(malformed)?;

    hours
        .checked_mul(MS_PER_HOUR)
        .and_then(|ms| ms.checked_add(minutes.checked_mul(MS_PER_MINUTE)?))
        .and_then(|ms| ms.checked_add(seconds.checked_mul(MS_PER_SECOND)?))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(malformed)
}

/// Encodes milliseconds as `HH:MM:SS,mmm`.
///
/// Hours are zero-padded to two digits and grow wider past 99 hours.
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / MS_PER_HOUR;
    let minutes = (ms % MS_PER_HOUR) / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / MS_PER_SECOND;
    let millis = ms % MS_PER_SECOND;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

fn parse_digits(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn parse_fraction(fraction: &str) -> Option<u64> {
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut digits: String = fraction.chars().take(3).collect();
    while digits.len() < 3 {
        digits.push('0');
    }
    digits.parse().ok()
}
