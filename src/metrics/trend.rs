use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::date_util::{first_of_month, shift_month, start_of_day, start_of_week};
use crate::error::{Error, Result};

/// Upper bound on the number of buckets in one series.
pub const MAX_WINDOW_COUNT: i64 = 520;

/// Calendar width of a trend bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendUnit {
    /// ISO week, Monday 00:00 UTC through Sunday.
    Week,
    /// Calendar month in UTC.
    Month,
}

impl FromStr for TrendUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "week" | "weeks" | "weekly" | "w" => Ok(TrendUnit::Week),
            "month" | "months" | "monthly" | "m" => Ok(TrendUnit::Month),
            other => Err(Error::Computation(format!("unrecognized trend unit: {other}"))),
        }
    }
}

/// A validated number of contiguous buckets of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendWindow {
    count: usize,
    unit: TrendUnit,
}

impl TrendWindow {
    pub const SIX_MONTHS: TrendWindow = TrendWindow {
        count: 6,
        unit: TrendUnit::Month,
    };

    pub const SIX_WEEKS: TrendWindow = TrendWindow {
        count: 6,
        unit: TrendUnit::Week,
    };

    pub fn new(count: i64, unit: TrendUnit) -> Result<Self> {
        if count < 0 {
            return Err(Error::Computation(format!(
                "trend window count must not be negative, got {count}"
            )));
        }
        if count > MAX_WINDOW_COUNT {
            return Err(Error::Computation(format!(
                "trend window count {count} exceeds {MAX_WINDOW_COUNT}"
            )));
        }
        Ok(Self {
            count: count as usize,
            unit,
        })
    }

    pub fn months(count: i64) -> Result<Self> {
        Self::new(count, TrendUnit::Month)
    }

    pub fn weeks(count: i64) -> Result<Self> {
        Self::new(count, TrendUnit::Week)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn unit(&self) -> TrendUnit {
        self.unit
    }

    /// Bucket boundaries, oldest first, the last one containing `now`.
    pub fn buckets(&self, now: DateTime<Utc>) -> Vec<TrendBucket> {
        let today = now.date_naive();
        (0..self.count)
            .rev()
            .map(|back| {
                let back = back as i64;
                let (start, next) = match self.unit {
                    TrendUnit::Week => {
                        let monday = start_of_week(today) - Duration::weeks(back);
                        (monday, monday + Duration::weeks(1))
                    }
                    TrendUnit::Month => {
                        let (y, m) = shift_month(today.year(), today.month(), -(back as i32));
                        let (ny, nm) = shift_month(y, m, 1);
                        (first_of_month(y, m), first_of_month(ny, nm))
                    }
                };
                let label = match self.unit {
                    TrendUnit::Week => {
                        let iw = start.iso_week();
                        format!("{}-W{:02}", iw.year(), iw.week())
                    }
                    TrendUnit::Month => format!("{}-{:02}", start.year(), start.month()),
                };
                TrendBucket {
                    label,
                    start: start_of_day(start),
                    end: start_of_day(next) - Duration::nanoseconds(1),
                }
            })
            .collect()
    }

    /// Start of the oldest bucket, for narrowing reads to the window.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.buckets(now).first().map(|b| b.start)
    }
}

/// Inclusive `[start, end]` bounds of one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendBucket {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TrendBucket {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period_label: String,
    pub count: u64,
    pub sum_value: f64,
}

/// Aggregate `records` into the buckets of `window` ending at `now`.
///
/// Records whose timestamp is `None` or outside the window are skipped.
/// The result always has exactly `window.count()` points, oldest first.
pub fn build_series<R, T, V>(
    records: &[R],
    window: TrendWindow,
    timestamp_of: T,
    value_of: V,
    now: DateTime<Utc>,
) -> Vec<TrendPoint>
where
    T: Fn(&R) -> Option<DateTime<Utc>>,
    V: Fn(&R) -> f64,
{
    let buckets = window.buckets(now);
    let mut points: Vec<TrendPoint> = buckets
        .iter()
        .map(|b| TrendPoint {
            period_label: b.label.clone(),
            count: 0,
            sum_value: 0.0,
        })
        .collect();

    for record in records {
        let Some(ts) = timestamp_of(record) else {
            continue;
        };
        // Buckets are contiguous and sorted, so the candidate is the last
        // one starting at or before `ts`.
        let idx = buckets.partition_point(|b| b.start <= ts);
        if idx == 0 {
            continue;
        }
        if buckets[idx - 1].contains(ts) {
            points[idx - 1].count += 1;
            points[idx - 1].sum_value += value_of(record);
        }
    }
    points
}
