//! Domain model of monitored services
//!
//! These are the records the check engine produces and the stores
//! persist: a [`ServiceStatus`] per service, holding its most recent
//! [`CheckResult`]s, health [`Event`]s and the [`Uptime`] aggregate.
//! The caps on every collection are enforced here, by the producer, so
//! stores never have to trim.

pub mod key;
pub mod result;
pub mod status;
pub mod uptime;

pub use key::{convert_group_and_service_to_key, split_key};
pub use result::{CheckResult, ConditionResult};
pub use status::{
    Event, EventType, MAXIMUM_NUMBER_OF_EVENTS, MAXIMUM_NUMBER_OF_RESULTS, Service, ServiceStatus,
};
pub use uptime::{HourlyUptimeStatistics, MAXIMUM_NUMBER_OF_HOURLY_BUCKETS, Uptime};
