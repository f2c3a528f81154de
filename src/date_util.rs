use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// First calendar day of the given month. `month` must be 1-12.
pub fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// Shift a `(year, month)` pair by `delta` months, wrapping across years.
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Monday of the ISO week containing `d`.
pub fn start_of_week(d: NaiveDate) -> NaiveDate {
    d - Duration::days(d.weekday().num_days_from_monday() as i64)
}

/// Midnight UTC at the start of `d`.
pub fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    d.and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Canonical timestamp encoding used in the warehouse. Fixed-width so that
/// lexicographic comparison in SQL matches chronological order.
pub fn to_sql_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 or a bare `YYYY-MM-DD`
/// (interpreted as midnight UTC).
pub fn parse_sql_ts(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(start_of_day)
        .map_err(|_| Error::TimestampParse(s.to_string()))
}

/// Round to one decimal place.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
