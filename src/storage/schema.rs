//! Relational row definitions and table layout
//!
//! ## Design Philosophy
//!
//! A [`ServiceStatus`] is a nested record; the relational store flattens
//! it into two tables per namespace:
//!
//! ### `<namespace>__services`
//! One row per service. Scalar identity columns (`key`, `name`,
//! `group_name`) plus the variable-shaped parts as JSON:
//! - `events_json` - text array, one JSON object per event
//! - `uptime_json` - one JSON object including the hourly buckets
//!
//! ### `<namespace>__results`
//! One row per result, tagged with the parent's key and removed with it
//! (`ON DELETE CASCADE`). Timestamps and durations are nanosecond
//! integers; condition results are a text array of JSON objects; errors
//! are a plain text array.
//!
//! ## Text Arrays
//!
//! SQLite has no `TEXT[]`, so array columns hold a JSON array of strings.
//! Element order is preserved.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use crate::model::{
    CheckResult, ConditionResult, Event, ServiceStatus, Uptime, convert_group_and_service_to_key,
};

/// What of a [`ServiceStatus`] is persisted in the relational store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredServiceStatus {
    pub name: String,
    pub group_name: String,

    /// At most 100 entries, the producer trims them
    pub results: Vec<StoredResult>,

    /// At most 50 entries, the producer trims them
    pub events: Vec<Event>,

    pub uptime: Uptime,
}

/// One row of the results table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResult {
    /// Assigned by the database, `None` until the row was read back
    pub id: Option<i64>,

    /// Key of the owning service, filled in on insert
    pub service_key: String,

    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub http_status: u16,
    pub condition_results: Vec<ConditionResult>,
    pub errors: Vec<String>,
    pub success: bool,
}

impl StoredServiceStatus {
    /// Storage key derived from group and name
    pub fn key(&self) -> String {
        convert_group_and_service_to_key(&self.group_name, &self.name)
    }

    pub fn from_service_status(status: &ServiceStatus) -> Self {
        let key = convert_group_and_service_to_key(&status.group, &status.name);
        Self {
            name: status.name.clone(),
            group_name: status.group.clone(),
            results: status
                .results
                .iter()
                .map(|result| StoredResult::from_check_result(&key, result))
                .collect(),
            events: status.events.iter().cloned().collect(),
            uptime: status.uptime.clone(),
        }
    }

    pub fn into_service_status(self) -> ServiceStatus {
        let key = self.key();
        ServiceStatus {
            name: self.name,
            group: self.group_name,
            key,
            results: self
                .results
                .into_iter()
                .map(StoredResult::into_check_result)
                .collect(),
            events: VecDeque::from(self.events),
            uptime: self.uptime,
        }
    }
}

impl StoredResult {
    pub fn from_check_result(service_key: &str, result: &CheckResult) -> Self {
        Self {
            id: None,
            service_key: service_key.to_string(),
            hostname: result.hostname.clone(),
            timestamp: result.timestamp,
            duration: result.duration,
            http_status: result.http_status,
            condition_results: result.condition_results.clone(),
            errors: result.errors.clone(),
            success: result.success,
        }
    }

    pub fn into_check_result(self) -> CheckResult {
        CheckResult {
            hostname: self.hostname,
            timestamp: self.timestamp,
            duration: self.duration,
            http_status: self.http_status,
            condition_results: self.condition_results,
            errors: self.errors,
            success: self.success,
        }
    }
}

/// Nanoseconds since the unix epoch, as stored in `timestamp_ns`
pub fn timestamp_to_nanos(timestamp: &DateTime<Utc>) -> StorageResult<i64> {
    timestamp.timestamp_nanos_opt().ok_or_else(|| {
        StorageError::SerializationError(format!(
            "timestamp {} cannot be represented in nanoseconds",
            timestamp
        ))
    })
}

pub fn nanos_to_timestamp(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

/// Nanoseconds, as stored in `duration_ns`
pub fn duration_to_nanos(duration: &Duration) -> StorageResult<i64> {
    i64::try_from(duration.as_nanos()).map_err(|_| {
        StorageError::SerializationError(format!("duration {:?} is too long to store", duration))
    })
}

pub fn nanos_to_duration(nanos: i64) -> StorageResult<Duration> {
    u64::try_from(nanos)
        .map(Duration::from_nanos)
        .map_err(|_| StorageError::SerializationError(format!("negative duration: {}ns", nanos)))
}

/// Encode a text array column
pub fn encode_text_array(elements: &[String]) -> StorageResult<String> {
    Ok(serde_json::to_string(elements)?)
}

/// Decode a text array column
pub fn decode_text_array(column: &str) -> StorageResult<Vec<String>> {
    Ok(serde_json::from_str(column)?)
}

/// Encode each element as one JSON document, then the documents as a text array
pub fn encode_json_array<T: Serialize>(elements: &[T]) -> StorageResult<String> {
    let documents = elements
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    encode_text_array(&documents)
}

/// Inverse of [`encode_json_array`]
pub fn decode_json_array<T: for<'de> Deserialize<'de>>(column: &str) -> StorageResult<Vec<T>> {
    decode_text_array(column)?
        .iter()
        .map(|document| serde_json::from_str(document).map_err(StorageError::from))
        .collect()
}

/// DDL of the services table
pub fn create_services_table(services_table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {services_table} (
            key           TEXT PRIMARY KEY NOT NULL,
            name          TEXT NOT NULL,
            group_name    TEXT NOT NULL,
            events_json   TEXT NOT NULL,
            uptime_json   TEXT NOT NULL,

            UNIQUE(group_name, name)
        )
        "#
    )
}

/// DDL of the results table
pub fn create_results_table(results_table: &str, services_table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {results_table} (
            id              INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            service_key     TEXT NOT NULL,
            hostname        TEXT NOT NULL,
            timestamp_ns    BIGINT NOT NULL,
            duration_ns     BIGINT NOT NULL,
            http_status     INTEGER NOT NULL,
            conditions_json TEXT NOT NULL,
            errors          TEXT NOT NULL,
            success         BOOLEAN NOT NULL,

            UNIQUE(service_key, timestamp_ns),
            CONSTRAINT fk_service
                FOREIGN KEY(service_key)
                REFERENCES {services_table}(key)
                ON DELETE CASCADE
        )
        "#
    )
}

/// DDL of the index on the results' join column
pub fn create_results_index(results_table: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {results_table}_service_key_idx ON {results_table} (service_key)"
    )
}
