//! Calendar-date handling.
//!
//! Dates are `YYYY-MM-DD` strings meaning a day on the user's wall calendar.
//! They are built from their three numeric parts in the target time zone,
//! never through a UTC parse, so the day does not shift near zone boundaries.
//! Every unlock/deadline comparison goes through [`start_of_day_in`] and
//! [`end_of_day_in`].

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};

const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parses a strict `YYYY-MM-DD` string. Anything else is `None`.
pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    if !value.is_ascii() || bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let number = |start: usize, end: usize| -> Option<u32> {
        let part = &value[start..end];
        if part.bytes().all(|byte| byte.is_ascii_digit()) {
            part.parse().ok()
        } else {
            None
        }
    };
    let year = number(0, 4)?;
    let month = number(5, 7)?;
    let day = number(8, 10)?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Local midnight of a strict `YYYY-MM-DD` date in `tz`.
pub fn parse_local_date_in<Tz: TimeZone>(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    parse_calendar_date(value).map(|date| start_of_day_in(date, tz))
}

pub fn start_of_day_in<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    resolve_local(tz, date.and_time(NaiveTime::MIN), false)
}

/// 23:59:59.999 on `date` in `tz`.
pub fn end_of_day_in<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Tz> {
    let last_milli = date.and_time(NaiveTime::MIN) + TimeDelta::milliseconds(86_399_999);
    resolve_local(tz, last_milli, true)
}

pub fn end_of_day<Tz: TimeZone>(at: &DateTime<Tz>) -> DateTime<Tz> {
    end_of_day_in(at.date_naive(), &at.timezone())
}

/// Parses a stored timestamp.
///
/// Accepts RFC 3339 (converted into `tz`), a naive `YYYY-MM-DDTHH:MM[:SS[.fff]]`
/// read as wall time in `tz`, or a bare calendar date read as its midnight.
pub fn parse_timestamp_in<Tz: TimeZone>(value: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    if value.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(tz));
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(resolve_local(tz, naive, false));
        }
    }
    parse_local_date_in(value, tz)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Local>> {
    parse_timestamp_in(value, &Local)
}

/// Maps wall time to an instant. Ambiguous times pick the earlier or later
/// instant as asked; times inside a DST gap move one hour toward the day's
/// interior.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime, latest: bool) -> DateTime<Tz> {
    let resolved = tz.from_local_datetime(&naive);
    let picked = if latest {
        resolved.latest()
    } else {
        resolved.earliest()
    };
    picked
        .or_else(|| {
            let shifted = if latest {
                naive - TimeDelta::hours(1)
            } else {
                naive + TimeDelta::hours(1)
            };
            tz.from_local_datetime(&shifted).earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}
