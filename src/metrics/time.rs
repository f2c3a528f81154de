//! Duration statistics and human-readable time formatting.
//!
//! Everything here is pure and synchronous.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use serde::Serialize;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Working hours credited for each weekday by [`business_hours`].
pub const BUSINESS_HOURS_PER_DAY: f64 = 8.0;

/// Summary statistics over a set of durations, in hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeMetrics {
    pub average_hours: f64,
    pub median_hours: f64,
    pub min_hours: f64,
    pub max_hours: f64,
    pub count: u64,
}

impl TimeMetrics {
    pub fn average_days(&self) -> f64 {
        self.average_hours / 24.0
    }

    pub fn median_days(&self) -> f64 {
        self.median_hours / 24.0
    }
}

/// Elapsed hours from `start` to `end`. Negative when `end` precedes
/// `start`; callers decide how to treat inverted intervals.
pub fn duration_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end.timestamp_millis() - start.timestamp_millis()) as f64 / MILLIS_PER_HOUR
}

/// Average, median and extremes of `hours`. Empty input yields all zeros.
pub fn summarize(hours: &[f64]) -> TimeMetrics {
    if hours.is_empty() {
        return TimeMetrics::default();
    }

    let mut sorted = hours.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let average = sorted.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    TimeMetrics {
        // Clamp guards the min <= average <= max invariant against float
        // summation error.
        average_hours: average.clamp(sorted[0], sorted[n - 1]),
        median_hours: median,
        min_hours: sorted[0],
        max_hours: sorted[n - 1],
        count: n as u64,
    }
}

/// Boundary equality counts as compliant.
pub fn is_sla_compliant(actual_hours: f64, target_hours: f64) -> bool {
    actual_hours <= target_hours
}

/// Percentage of compliant items; 0 when `total` is 0.
pub fn compliance_rate(compliant: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    compliant as f64 / total as f64 * 100.0
}

/// Working hours between two instants: [`BUSINESS_HOURS_PER_DAY`] for each
/// Monday-Friday calendar day in `[start, end]` (both dates inclusive).
///
/// Public holidays are not taken into account.
pub fn business_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let last = end.date_naive();
    let mut day = start.date_naive();
    let mut hours = 0.0;
    while day <= last {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            hours += BUSINESS_HOURS_PER_DAY;
        }
        day += Duration::days(1);
    }
    hours
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Render a duration in hours as minutes, hours (+ minutes) or days
/// (+ hours), e.g. `45 minutes`, `2 hours 30 minutes`, `3 days 1 hour`.
pub fn format_duration(hours: f64) -> String {
    if hours < 0.0 {
        return format!("-{}", format_duration(-hours));
    }

    let total_minutes = (hours * 60.0).round() as i64;
    if total_minutes < 60 {
        return plural(total_minutes, "minute");
    }

    if total_minutes < 24 * 60 {
        let h = total_minutes / 60;
        let m = total_minutes % 60;
        return match m {
            0 => plural(h, "hour"),
            m => format!("{} {}", plural(h, "hour"), plural(m, "minute")),
        };
    }

    let total_hours = hours.round() as i64;
    let d = total_hours / 24;
    let h = total_hours % 24;
    match h {
        0 => plural(d, "day"),
        h => format!("{} {}", plural(d, "day"), plural(h, "hour")),
    }
}

/// Relative description of `past` as seen from `now`, e.g. `3 hours ago`.
pub fn time_ago(past: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - past;
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{} ago", plural(minutes, "minute"));
    }

    let hours = elapsed.num_hours();
    if hours < 24 {
        return format!("{} ago", plural(hours, "hour"));
    }

    let days = elapsed.num_days();
    if days < 7 {
        return format!("{} ago", plural(days, "day"));
    }
    if days < 30 {
        return format!("{} ago", plural(days / 7, "week"));
    }

    let months = (days as f64 / 30.0).round() as i64;
    format!("{} ago", plural(months, "month"))
}
