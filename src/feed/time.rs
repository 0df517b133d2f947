//! Tolerant parsing of the timestamps found in RSS `<pubDate>` elements.
//!
//! Feeds in the wild disagree on date formats. [`parse_timestamp`] tries a
//! fixed list of layouts in order and returns the first match, normalized to
//! UTC. A string that matches nothing is a recoverable condition: callers
//! store the item without a publish date.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("no known layout matched timestamp {0:?}")]
    NoLayoutMatched(String),
}

/// Supported timestamp layouts, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Z,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Z,
    /// `02 Jan 06 15:04 MST`
    Rfc822,
    /// `2006-01-02T15:04:05Z07:00`
    Iso8601,
    /// `2006-01-02 15:04:05`, interpreted as UTC
    Plain,
}

pub const LAYOUTS: [Layout; 6] = [
    Layout::Rfc1123Z,
    Layout::Rfc1123,
    Layout::Rfc822Z,
    Layout::Rfc822,
    Layout::Iso8601,
    Layout::Plain,
];

impl Layout {
    pub fn parse(self, input: &str) -> Option<DateTime<Utc>> {
        match self {
            Layout::Rfc1123Z => parse_numeric_zone(strip_weekday(input), "%d %b %Y %H:%M:%S %z"),
            Layout::Rfc1123 => parse_named_zone(strip_weekday(input), "%d %b %Y %H:%M:%S"),
            Layout::Rfc822Z => parse_numeric_zone(strip_weekday(input), "%d %b %y %H:%M %z"),
            Layout::Rfc822 => parse_named_zone(strip_weekday(input), "%d %b %y %H:%M"),
            Layout::Iso8601 => DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Layout::Plain => NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc()),
        }
    }
}

/// Parse a feed timestamp, trying each of [`LAYOUTS`] in order.
///
/// Surrounding whitespace is ignored. Day names are not checked against the
/// date, since feeds frequently get them wrong.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let trimmed = raw.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(trimmed))
        .ok_or_else(|| TimeParseError::NoLayoutMatched(raw.to_string()))
}

fn strip_weekday(input: &str) -> &str {
    match input.split_once(',') {
        Some((day, rest)) if !day.is_empty() && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => input,
    }
}

fn parse_numeric_zone(input: &str, fmt: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(input, fmt)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_named_zone(input: &str, fmt: &str) -> Option<DateTime<Utc>> {
    let (body, zone) = input.rsplit_once(char::is_whitespace)?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(body.trim_end(), fmt).ok()?;
    let offset = FixedOffset::east_opt(zone_offset_hours(zone) * 3600)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// RFC 822 zone names. Unrecognised abbreviations are treated as UTC.
fn zone_offset_hours(zone: &str) -> i32 {
    match zone.to_ascii_uppercase().as_str() {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_rfc1123_numeric_zone() {
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 -0700").unwrap(),
            utc("2006-01-02T22:04:05Z")
        );
    }

    #[test]
    fn test_rfc1123_named_zone() {
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 GMT").unwrap(),
            utc("2006-01-02T15:04:05Z")
        );
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 PST").unwrap(),
            utc("2006-01-02T23:04:05Z")
        );
    }

    #[test]
    fn test_rfc822_numeric_zone() {
        assert_eq!(
            parse_timestamp("02 Jan 06 15:04 -0700").unwrap(),
            utc("2006-01-02T22:04:00Z")
        );
    }

    #[test]
    fn test_rfc822_named_zone() {
        assert_eq!(
            parse_timestamp("02 Jan 06 15:04 MST").unwrap(),
            utc("2006-01-02T22:04:00Z")
        );
    }

    #[test]
    fn test_iso8601() {
        assert_eq!(
            parse_timestamp("2006-01-02T15:04:05Z").unwrap(),
            utc("2006-01-02T15:04:05Z")
        );
        assert_eq!(
            parse_timestamp("2006-01-02T15:04:05+07:00").unwrap(),
            utc("2006-01-02T08:04:05Z")
        );
    }

    #[test]
    fn test_plain_layout_is_utc() {
        assert_eq!(
            parse_timestamp("2006-01-02 15:04:05").unwrap(),
            utc("2006-01-02T15:04:05Z")
        );
    }

    #[test]
    fn test_unknown_zone_abbreviation_is_utc() {
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 XYZ").unwrap(),
            utc("2006-01-02T15:04:05Z")
        );
    }

    #[test]
    fn test_wrong_weekday_tolerated() {
        assert_eq!(
            parse_timestamp("Fri, 02 Jan 2006 15:04:05 +0000").unwrap(),
            utc("2006-01-02T15:04:05Z")
        );
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(
            parse_timestamp("\n  Mon, 02 Jan 2006 15:04:05 +0000  \n").unwrap(),
            utc("2006-01-02T15:04:05Z")
        );
    }

    #[test]
    fn test_first_matching_layout_wins() {
        let input = "Mon, 02 Jan 2006 15:04:05 -0700";
        let first = LAYOUTS.iter().position(|l| l.parse(input).is_some());
        assert_eq!(first, Some(0));
        assert!(Layout::Rfc1123.parse(input).is_none());
    }

    #[test]
    fn test_unparseable_is_error() {
        assert_eq!(
            parse_timestamp("not-a-date"),
            Err(TimeParseError::NoLayoutMatched("not-a-date".to_string()))
        );
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2006-13-45 99:99:99").is_err());
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in "\\PC*") {
            let _ = parse_timestamp(&input);
        }
    }
}
