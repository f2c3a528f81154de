use std::collections::HashMap;

use serde::Serialize;

use crate::gateway::{Dimension, GroupRow};

/// One group of a categorical partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionBucket {
    pub label: String,
    pub count: u64,
    pub sum_value: f64,
    /// Share of the partition's total count, one decimal place. The shares
    /// of a distribution add up to exactly 100.
    pub percentage: f64,
}

/// A record set partitioned on one dimension. Buckets are ordered by count
/// descending, then label ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub dimension: Dimension,
    pub total: u64,
    pub buckets: Vec<DistributionBucket>,
}

impl Distribution {
    pub fn empty(dimension: Dimension) -> Self {
        Self {
            dimension,
            total: 0,
            buckets: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&DistributionBucket> {
        self.buckets.iter().find(|b| b.label == label)
    }
}

/// Shares of `total` in tenths of a percent, apportioned by largest
/// remainder so they add up to exactly 1000. Ties on the remainder go to the
/// earlier entry of `counts`.
fn apportion(counts: &[u64], total: u64) -> Vec<u64> {
    if total == 0 {
        return vec![0; counts.len()];
    }
    let mut tenths: Vec<u64> = counts.iter().map(|c| c * 1000 / total).collect();
    let short = 1000u64.saturating_sub(tenths.iter().sum());
    let mut by_remainder: Vec<usize> = (0..counts.len()).collect();
    by_remainder.sort_by_key(|&i| std::cmp::Reverse(counts[i] * 1000 % total));
    for &i in by_remainder.iter().take(short as usize) {
        tenths[i] += 1;
    }
    tenths
}

fn finish(dimension: Dimension, groups: Vec<(String, u64, f64)>) -> Distribution {
    let total: u64 = groups.iter().map(|(_, count, _)| count).sum();
    let mut buckets: Vec<DistributionBucket> = groups
        .into_iter()
        .map(|(label, count, sum_value)| DistributionBucket {
            label,
            count,
            sum_value,
            percentage: 0.0,
        })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

    let counts: Vec<u64> = buckets.iter().map(|b| b.count).collect();
    for (bucket, tenths) in buckets.iter_mut().zip(apportion(&counts, total)) {
        bucket.percentage = tenths as f64 / 10.0;
    }
    Distribution {
        dimension,
        total,
        buckets,
    }
}

/// Group `records` by `key_of`, summing `value_of` per group.
///
/// The dimension tag labels the output; it does not affect grouping.
pub fn aggregate<R, K, V>(records: &[R], dimension: Dimension, key_of: K, value_of: V) -> Distribution
where
    K: Fn(&R) -> String,
    V: Fn(&R) -> f64,
{
    let mut groups: HashMap<String, (u64, f64)> = HashMap::new();
    for record in records {
        let entry = groups.entry(key_of(record)).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += value_of(record);
    }
    finish(
        dimension,
        groups
            .into_iter()
            .map(|(label, (count, sum))| (label, count, sum))
            .collect(),
    )
}

/// Build a distribution from pre-aggregated gateway rows.
pub fn from_groups(dimension: Dimension, rows: Vec<GroupRow>) -> Distribution {
    finish(
        dimension,
        rows.into_iter().map(|r| (r.key, r.count, r.sum)).collect(),
    )
}
