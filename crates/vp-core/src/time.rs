//! Date and time helpers shared by the store and the planners.
//!
//! Instants are always `DateTime<Utc>`. Calendar dates only become instants
//! through a business timezone, so every conversion here takes one.

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};

use crate::types::ValidationError;

/// Formats an instant for storage: RFC 3339, UTC, millisecond precision.
///
/// The fixed width keeps lexicographic order equal to chronological order.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses an RFC 3339 timestamp with any offset into UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        value: value.to_string(),
    })
}

/// Parses an `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| ValidationError::InvalidTime {
        value: value.to_string(),
    })
}

/// Converts a local wall-clock date and time to UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times that
/// fall in a DST gap are rejected rather than shifted.
pub fn local_to_utc<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<DateTime<Utc>, ValidationError> {
    let local = NaiveDateTime::new(date, time);
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
        LocalResult::None => Err(ValidationError::NonexistentLocalTime {
            value: local.to_string(),
        }),
    }
}

/// Returns the half-open UTC interval `[date 00:00, date+1 00:00)` in `tz`.
pub fn day_bounds<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    (start_of_day(tz, date), start_of_day(tz, next))
}

/// The calendar date an instant falls on in `tz`.
pub fn local_date<Tz: TimeZone>(tz: &Tz, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Iterates the dates of an inclusive span.
pub fn dates_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |date| *date <= end)
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = NaiveDateTime::new(date, NaiveTime::MIN);
    if let Some(dt) = tz.from_local_datetime(&midnight).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Midnight skipped by a DST transition: the day starts at the first whole
    // hour that exists.
    (1..=3)
        .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map_or_else(
            || Utc.from_utc_datetime(&midnight),
            |dt| dt.with_timezone(&Utc),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono_tz::Europe::Brussels;

    #[test]
    fn format_timestamp_is_fixed_width_utc() {
        let ts = parse_timestamp("2026-02-10T09:00:00+01:00").unwrap();
        assert_eq!(format_timestamp(ts), "2026-02-10T08:00:00.000Z");
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp("tomorrow"),
            Err(ValidationError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn local_to_utc_applies_winter_offset() {
        let date = parse_date("2026-02-10").unwrap();
        let time = parse_time_of_day("09:00").unwrap();
        let utc = local_to_utc(&Brussels, date, time).unwrap();
        assert_eq!(format_timestamp(utc), "2026-02-10T08:00:00.000Z");
    }

    #[test]
    fn local_to_utc_rejects_dst_gap() {
        let date = parse_date("2026-03-29").unwrap();
        let time = parse_time_of_day("02:30").unwrap();
        assert!(matches!(
            local_to_utc(&Brussels, date, time),
            Err(ValidationError::NonexistentLocalTime { .. })
        ));
    }

    #[test]
    fn day_bounds_follow_timezone() {
        let date = parse_date("2026-07-01").unwrap();
        let (start, end) = day_bounds(&Brussels, date);
        assert_eq!(format_timestamp(start), "2026-06-30T22:00:00.000Z");
        assert_eq!(format_timestamp(end), "2026-07-01T22:00:00.000Z");
    }

    #[test]
    fn day_bounds_in_utc() {
        let date = parse_date("2026-02-10").unwrap();
        let (start, end) = day_bounds(&Utc, date);
        assert_eq!(format_timestamp(start), "2026-02-10T00:00:00.000Z");
        assert_eq!(format_timestamp(end), "2026-02-11T00:00:00.000Z");
    }

    #[test]
    fn dates_inclusive_includes_both_ends() {
        let start = parse_date("2026-02-27").unwrap();
        let end = parse_date("2026-03-02").unwrap();
        let dates: Vec<String> = dates_inclusive(start, end).map(|d| d.to_string()).collect();
        assert_eq!(
            dates,
            vec!["2026-02-27", "2026-02-28", "2026-03-01", "2026-03-02"]
        );
    }

    #[test]
    fn parse_time_rejects_seconds_format() {
        assert!(parse_time_of_day("9h").is_err());
        assert!(parse_date("10/02/2026").is_err());
    }
}
