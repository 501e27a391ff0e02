use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single evaluated condition, e.g. `[STATUS] == 200`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub condition: String,
    pub success: bool,
}

/// The outcome of one executed health check
///
/// Results are produced by the check engine and never modified once they
/// are handed to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Host the check was executed against
    pub hostname: String,

    /// When the check was executed
    pub timestamp: DateTime<Utc>,

    /// How long the request took
    pub duration: Duration,

    /// HTTP status code of the response (0 if there was none)
    pub http_status: u16,

    /// Every evaluated condition, in evaluation order
    pub condition_results: Vec<ConditionResult>,

    /// Errors encountered while executing the check
    pub errors: Vec<String>,

    /// Whether every condition passed
    pub success: bool,
}

impl CheckResult {
    /// Response time in whole milliseconds, as accounted in uptime buckets
    pub fn response_time_millis(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}
