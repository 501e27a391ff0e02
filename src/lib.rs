pub mod actors;
pub mod config;
pub mod model;
pub mod storage;

pub use crate::model::{CheckResult, ConditionResult, Event, EventType, Service, ServiceStatus};
