use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::key::convert_group_and_service_to_key;
use super::result::CheckResult;
use super::uptime::Uptime;

/// Maximum results kept per service
pub const MAXIMUM_NUMBER_OF_RESULTS: usize = 100;

/// Maximum events kept per service
pub const MAXIMUM_NUMBER_OF_EVENTS: usize = 50;

/// Descriptor of a monitored service as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub group: String,
}

impl Service {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    pub fn key(&self) -> String {
        convert_group_and_service_to_key(&self.group, &self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Monitoring of the service started
    Start,

    /// The service became healthy
    Healthy,

    /// The service became unhealthy
    Unhealthy,
}

/// A transition in a service's health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn from_result(result: &CheckResult) -> Self {
        Self {
            event_type: if result.success {
                EventType::Healthy
            } else {
                EventType::Unhealthy
            },
            timestamp: result.timestamp,
        }
    }
}

/// Health history of one monitored service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub group: String,
    pub key: String,

    /// Most recent results, oldest first
    pub results: VecDeque<CheckResult>,

    /// Most recent events, oldest first
    pub events: VecDeque<Event>,

    pub uptime: Uptime,
}

impl ServiceStatus {
    /// Create the status of a service that has not been checked yet
    pub fn new(service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            group: service.group.clone(),
            key: service.key(),
            results: VecDeque::new(),
            events: VecDeque::from([Event {
                event_type: EventType::Start,
                timestamp: Utc::now(),
            }]),
            uptime: Uptime::new(),
        }
    }

    /// Append a result, recording an event if the health changed
    ///
    /// Results and events are trimmed from the front once they exceed
    /// their caps. A result is identified by its timestamp: one with the
    /// timestamp of an already recorded result is dropped.
    pub fn add_result(&mut self, result: CheckResult) {
        if self
            .results
            .iter()
            .any(|recorded| recorded.timestamp == result.timestamp)
        {
            debug!(
                "dropping result for {} with duplicate timestamp {}",
                self.key, result.timestamp
            );
            return;
        }

        let changed = self
            .results
            .back()
            .is_none_or(|previous| previous.success != result.success);
        if changed {
            self.events.push_back(Event::from_result(&result));
            while self.events.len() > MAXIMUM_NUMBER_OF_EVENTS {
                self.events.pop_front();
            }
        }

        self.uptime.process_result(&result);

        self.results.push_back(result);
        while self.results.len() > MAXIMUM_NUMBER_OF_RESULTS {
            self.results.pop_front();
        }
    }

    /// Copy of this status with only one page of results
    ///
    /// Pages are 1-indexed and counted from the newest result; the page
    /// keeps chronological order. Pages past the end are empty.
    pub fn with_result_pagination(&self, page: usize, page_size: usize) -> Self {
        let total = self.results.len();
        let window = page
            .checked_sub(1)
            .and_then(|skipped_pages| skipped_pages.checked_mul(page_size))
            .filter(|newer| page_size > 0 && *newer < total)
            .map(|newer| {
                let end = total - newer;
                (end.saturating_sub(page_size), end)
            });

        let results = match window {
            Some((start, end)) => self.results.range(start..end).cloned().collect(),
            None => VecDeque::new(),
        };

        Self {
            name: self.name.clone(),
            group: self.group.clone(),
            key: self.key.clone(),
            results,
            events: self.events.clone(),
            uptime: self.uptime.clone(),
        }
    }
}
