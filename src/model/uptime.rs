//! Rolling uptime aggregates
//!
//! Every processed result is accounted in the bucket of the hour it was
//! executed in. The 1h/24h/7d ratios are recomputed from those buckets
//! relative to the current time.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::result::CheckResult;

/// Number of hourly buckets kept per service (10 days)
pub const MAXIMUM_NUMBER_OF_HOURLY_BUCKETS: usize = 10 * 24;

const SECONDS_PER_HOUR: i64 = 3600;

/// Number of hourly samples needed to cover the 7 day window
const SEVEN_DAYS_IN_HOURS: i64 = 7 * 24;

/// Execution statistics of one hour
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyUptimeStatistics {
    pub total_executions: u64,
    pub successful_executions: u64,

    /// Sum of all response times in milliseconds
    pub total_executions_response_time: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Uptime {
    pub last_seven_days: f64,
    pub last_twenty_four_hours: f64,
    pub last_hour: f64,

    /// Statistics keyed by unix timestamp truncated to the hour
    pub hourly_statistics: BTreeMap<i64, HourlyUptimeStatistics>,
}

/// Truncate a point in time to the start of its hour, in unix seconds
pub fn hour_bucket(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp().div_euclid(SECONDS_PER_HOUR) * SECONDS_PER_HOUR
}

impl Uptime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account a result in its hourly bucket and refresh the ratios
    pub fn process_result(&mut self, result: &CheckResult) {
        let stats = self
            .hourly_statistics
            .entry(hour_bucket(result.timestamp))
            .or_default();
        stats.total_executions += 1;
        if result.success {
            stats.successful_executions += 1;
        }
        stats.total_executions_response_time = stats
            .total_executions_response_time
            .saturating_add(result.response_time_millis());

        while self.hourly_statistics.len() > MAXIMUM_NUMBER_OF_HOURLY_BUCKETS {
            self.hourly_statistics.pop_first();
        }

        self.recalculate(Utc::now());
    }

    /// Recompute the 1h/24h/7d ratios relative to `now`
    ///
    /// A ratio keeps its previous value if its window holds no executions.
    pub fn recalculate(&mut self, now: DateTime<Utc>) {
        let mut week = (0u64, 0u64);
        let mut day = (0u64, 0u64);
        let mut hour = (0u64, 0u64);

        for hours_ago in 0..=SEVEN_DAYS_IN_HOURS {
            let sampled_at = now - Duration::hours(hours_ago);
            let Some(stats) = self.hourly_statistics.get(&hour_bucket(sampled_at)) else {
                continue;
            };
            if stats.total_executions == 0 {
                continue;
            }
            let counts = (stats.successful_executions, stats.total_executions);
            accumulate(&mut week, counts);
            if hours_ago <= 24 {
                accumulate(&mut day, counts);
            }
            if hours_ago <= 1 {
                accumulate(&mut hour, counts);
            }
        }

        if let Some(ratio) = ratio(week) {
            self.last_seven_days = ratio;
        }
        if let Some(ratio) = ratio(day) {
            self.last_twenty_four_hours = ratio;
        }
        if let Some(ratio) = ratio(hour) {
            self.last_hour = ratio;
        }
    }
}

fn accumulate(bracket: &mut (u64, u64), (successful, total): (u64, u64)) {
    bracket.0 += successful;
    bracket.1 += total;
}

fn ratio((successful, total): (u64, u64)) -> Option<f64> {
    (total > 0).then(|| successful as f64 / total as f64)
}
