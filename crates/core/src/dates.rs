//! Date parsing for list cells.
//!
//! Slack List cells arrive as ISO dates, RFC 3339 timestamps, human-formatted
//! strings, or raw Unix timestamps depending on the column type and the client
//! that wrote them. Everything is normalized to a calendar date.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DateParseError {
    #[error("date value is empty")]
    Empty,
    #[error("unrecognized date value `{0}`")]
    Unrecognized(String),
    #[error("date `{0}` is outside years 1 to 9999")]
    OutOfRange(String),
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%d %b %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] =
    &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;
const YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

/// Parses a cell into a calendar date. Years outside 1..=9999 are rejected so
/// chart arithmetic on the result can never overflow.
pub fn parse_date(input: &str) -> Result<NaiveDate, DateParseError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(DateParseError::Empty);
    }

    let date = parse_any(value)?;
    if !YEARS.contains(&date.year()) {
        return Err(DateParseError::OutOfRange(value.to_owned()));
    }
    Ok(date)
}

fn parse_any(value: &str) -> Result<NaiveDate, DateParseError> {
    if let Some(date) = parse_timestamp(value) {
        return Ok(date);
    }

    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.date_naive());
    }

    if let Some(date) =
        DATETIME_FORMATS.iter().find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Ok(date.date());
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .ok_or_else(|| DateParseError::Unrecognized(value.to_owned()))
}

/// Seconds since the epoch (10+ digits), or milliseconds above 10^12. Read as UTC.
fn parse_timestamp(value: &str) -> Option<NaiveDate> {
    if value.len() < 10 || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    let raw = value.parse::<i64>().ok()?;
    let datetime = if raw > MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(raw)?
    } else {
        DateTime::from_timestamp(raw, 0)?
    };
    Some(datetime.date_naive())
}

pub fn format_date(date: NaiveDate, fmt: &str) -> String {
    date.format(fmt).to_string()
}

/// Inclusive day count between two dates, never less than one.
pub fn date_range_days(start: NaiveDate, end: NaiveDate) -> i64 {
    ((end - start).num_days() + 1).max(1)
}

pub fn date_bounds<I>(dates: I) -> Option<(NaiveDate, NaiveDate)>
where
    I: IntoIterator<Item = NaiveDate>,
{
    dates.into_iter().fold(None, |bounds, date| match bounds {
        None => Some((date, date)),
        Some((min, max)) => Some((min.min(date), max.max(date))),
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{date_bounds, date_range_days, format_date, parse_date, DateParseError};

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn parses_iso_dates_and_datetimes() {
        assert_eq!(parse_date("2024-01-05"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date(" 2024/01/05 "), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05T13:45:00Z"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05T23:30:00-05:00"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05T08:15:30.250"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05 08:15"), Ok(ymd(2024, 1, 5)));
    }

    #[test]
    fn parses_common_human_formats() {
        assert_eq!(parse_date("01/05/2024"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("05.01.2024"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("Jan 5, 2024"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("January 5, 2024"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("5 Jan 2024"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("5 January 2024"), Ok(ymd(2024, 1, 5)));
    }

    #[test]
    fn parses_unix_timestamps_in_seconds_and_millis() {
        assert_eq!(parse_date("1704412800"), Ok(ymd(2024, 1, 5)));
        assert_eq!(parse_date("1704412800000"), Ok(ymd(2024, 1, 5)));
    }

    #[test]
    fn short_digit_strings_are_not_timestamps() {
        assert_eq!(parse_date("20240105"), Err(DateParseError::Unrecognized("20240105".into())));
    }

    #[test]
    fn rejects_blank_and_garbage() {
        assert_eq!(parse_date("   "), Err(DateParseError::Empty));
        assert!(matches!(parse_date("next tuesday"), Err(DateParseError::Unrecognized(_))));
        assert!(matches!(parse_date("2024-13-40"), Err(DateParseError::Unrecognized(_))));
    }

    #[test]
    fn years_beyond_four_digits_are_out_of_range() {
        assert_eq!(
            parse_date("+262142-12-31"),
            Err(DateParseError::OutOfRange("+262142-12-31".into()))
        );
        assert_eq!(
            parse_date("300000000000000"),
            Err(DateParseError::OutOfRange("300000000000000".into()))
        );
        assert_eq!(parse_date("9999-12-31"), Ok(ymd(9999, 12, 31)));
    }

    #[test]
    fn range_days_is_inclusive_with_floor_of_one() {
        assert_eq!(date_range_days(ymd(2024, 1, 1), ymd(2024, 1, 5)), 5);
        assert_eq!(date_range_days(ymd(2024, 1, 3), ymd(2024, 1, 3)), 1);
        assert_eq!(date_range_days(ymd(2024, 1, 3), ymd(2024, 1, 1)), 1);
    }

    #[test]
    fn bounds_cover_all_dates() {
        let bounds = date_bounds([ymd(2024, 1, 3), ymd(2023, 12, 30), ymd(2024, 2, 1)]);
        assert_eq!(bounds, Some((ymd(2023, 12, 30), ymd(2024, 2, 1))));
        assert_eq!(date_bounds(std::iter::empty()), None);
    }

    #[test]
    fn formats_with_strftime_pattern() {
        assert_eq!(format_date(ymd(2024, 1, 5), "%b %d"), "Jan 05");
    }
}
