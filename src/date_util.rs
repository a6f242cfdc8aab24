use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parse an IANA timezone name such as `America/New_York`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::Configuration(format!("unknown timezone: {name}")))
}

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt()
}

/// The civil date `instant` falls on in `tz`.
pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

/// The UTC instant of the first moment of `date` in `tz`.
///
/// When midnight does not exist locally (a DST gap starting at 00:00) the
/// first valid wall-clock time after it is used; when it is ambiguous the
/// earlier of the two instants wins.
pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = NaiveDateTime::new(date, NaiveTime::MIN);
    for step in 0..=16 {
        let candidate = midnight + Duration::minutes(15 * step);
        if let Some(dt) = tz.from_local_datetime(&candidate).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    tz.from_utc_datetime(&midnight).with_timezone(&Utc)
}

/// The UTC instant of the last millisecond of `date` in `tz`.
pub fn local_end_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let next = date.succ_opt().unwrap_or(date);
    local_midnight(next, tz) - Duration::milliseconds(1)
}

/// Number of calendar days from `start` through `end`, never less than 1.
pub fn inclusive_day_count(start: NaiveDate, end: NaiveDate) -> u32 {
    let days = (end - start).num_days() + 1;
    days.max(1) as u32
}

pub fn to_db_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(DB_TIMESTAMP_FORMAT).to_string()
}

pub fn from_db_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("bad stored timestamp {s}: {e}")))
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("invalid date (expected YYYY-MM-DD): {s}")))
}

/// Parse a user supplied instant: RFC3339, or a bare date placed at local
/// midnight in `tz`.
pub fn parse_instant(s: &str, tz: Tz) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    parse_date(s).map(|d| local_midnight(d, tz))
}

/// First day of the month `date` falls in.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
