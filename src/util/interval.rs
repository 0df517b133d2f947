use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntervalError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("duration {0:?} is too large")]
    Overflow(String),
    #[error("duration {0:?} must be greater than zero")]
    NotPositive(String),
}

const NANOS_PER: [(&str, u128); 8] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Parse a tick interval such as `1m`, `30s`, `1h30m` or `1.5h`.
///
/// The grammar is a sequence of decimal numbers each followed by a unit
/// (`ns`, `us`, `ms`, `s`, `m`, `h`). Zero and negative intervals are
/// rejected since the loop could never wait between cycles.
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let invalid = || IntervalError::Invalid(input.to_string());
    let mut rest = input.trim();

    let negative = match rest.as_bytes().first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    if rest == "0" {
        return Err(IntervalError::NotPositive(input.to_string()));
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, frac, after) = split_number(rest).ok_or_else(invalid)?;

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let unit = &after[..unit_len];
        if unit.is_empty() {
            return Err(IntervalError::Invalid(input.to_string()));
        }
        let scale = NANOS_PER
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| IntervalError::UnknownUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

        total = whole
            .checked_mul(scale)
            .and_then(|n| n.checked_add(fraction_nanos(frac, scale)))
            .and_then(|n| total.checked_add(n))
            .ok_or_else(|| IntervalError::Overflow(input.to_string()))?;

        rest = &after[unit_len..];
    }

    if negative || total == 0 {
        return Err(IntervalError::NotPositive(input.to_string()));
    }

    let secs = u64::try_from(total / 1_000_000_000)
        .map_err(|_| IntervalError::Overflow(input.to_string()))?;
    Ok(Duration::new(secs, (total % 1_000_000_000) as u32))
}

/// Split a leading `123.45` into its integer value, fractional digits and the remainder.
fn split_number(s: &str) -> Option<(u128, &str, &str)> {
    let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (int_digits, after_int) = s.split_at(int_len);

    let (frac_digits, after) = match after_int.strip_prefix('.') {
        Some(tail) => {
            let len = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
            tail.split_at(len)
        }
        None => ("", after_int),
    };

    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let whole = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse().ok()?
    };
    Some((whole, frac_digits, after))
}

/// Nanoseconds contributed by `.digits` of a unit worth `scale` ns, truncated.
fn fraction_nanos(digits: &str, scale: u128) -> u128 {
    let mut value = 0u128;
    let mut denom = 1u128;
    // Digits past nanosecond precision cannot change the result.
    for d in digits.bytes().take(24) {
        value = value * 10 + u128::from(d - b'0');
        denom *= 10;
    }
    value * scale / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_interval("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_interval("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_interval("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_interval("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_interval("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_interval("10µs"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_interval("7ns"), Ok(Duration::from_nanos(7)));
    }

    #[test]
    fn test_compound_and_fractional() {
        assert_eq!(parse_interval("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_interval("1m0.5s"), Ok(Duration::from_millis(60_500)));
        assert_eq!(parse_interval("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_interval(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_interval("+5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_interval(" 10s "), Ok(Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_and_negative_rejected() {
        for input in ["0", "0s", "0h0m", "-1m", "-0"] {
            assert!(
                matches!(parse_interval(input), Err(IntervalError::NotPositive(_))),
                "{input} accepted"
            );
        }
    }

    #[test]
    fn test_malformed() {
        for input in ["", "10", "abc", "s", "1.s.", "-", "."] {
            assert!(parse_interval(input).is_err(), "{input} accepted");
        }
        assert!(matches!(
            parse_interval("5d"),
            Err(IntervalError::UnknownUnit { unit, .. }) if unit == "d"
        ));
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            parse_interval("999999999999999999999999999999999999h"),
            Err(IntervalError::Overflow(_)) | Err(IntervalError::Invalid(_))
        ));
    }
}
