//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait that every store
//! implements, and the [`Backend`] enum the supervisor hands out.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::memory::MemoryBackend;
#[cfg(feature = "storage-sqlite")]
use super::sqlite::SqliteBackend;
use crate::model::{CheckResult, Service, ServiceStatus};

/// Trait for service status stores
///
/// This is the only boundary through which the check engine and the
/// dashboard touch persistence.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across tasks.
/// Inserts for the same key are applied in the order they are received.
///
/// ## Error Handling
///
/// A missing service is `Ok(None)`, never an error. Errors are reserved
/// for failures of the backend itself.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Every known service, with its results limited to one page
    ///
    /// Pages are 1-indexed and counted from the newest result. A page
    /// past the end yields an empty result list, not an error.
    async fn get_all_service_statuses_with_result_pagination(
        &self,
        page: usize,
        page_size: usize,
    ) -> StorageResult<HashMap<String, ServiceStatus>>;

    /// Status of the service `name` in `group`
    async fn get_service_status(
        &self,
        group: &str,
        name: &str,
    ) -> StorageResult<Option<ServiceStatus>>;

    /// Status stored under `key`
    async fn get_service_status_by_key(&self, key: &str) -> StorageResult<Option<ServiceStatus>>;

    /// Record a result for a service, creating its status if needed
    async fn insert(&self, service: &Service, result: CheckResult) -> StorageResult<()>;

    /// Remove every service whose key is not in `keys`
    ///
    /// Used to drop services that are no longer monitored. Returns the
    /// number of removed services.
    async fn delete_all_service_statuses_not_in_keys(&self, keys: &[String])
    -> StorageResult<usize>;

    /// Remove everything
    async fn clear(&self) -> StorageResult<()>;

    /// Flush the current state to durable media
    ///
    /// A no-op for stores without one. A failed save leaves the
    /// in-memory state untouched.
    async fn save(&self) -> StorageResult<()>;
}

/// The store variants the supervisor can activate
pub enum Backend {
    /// In-memory store, optionally persisted to a file
    Memory(MemoryBackend),

    /// Relational store
    #[cfg(feature = "storage-sqlite")]
    Sqlite(SqliteBackend),
}

impl Backend {
    /// Whether `save` writes anywhere
    pub fn has_durable_medium(&self) -> bool {
        match self {
            Backend::Memory(memory) => memory.file().is_some(),
            #[cfg(feature = "storage-sqlite")]
            Backend::Sqlite(_) => true,
        }
    }

    fn inner(&self) -> &dyn StorageBackend {
        match self {
            Backend::Memory(memory) => memory,
            #[cfg(feature = "storage-sqlite")]
            Backend::Sqlite(sqlite) => sqlite,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Memory(memory) => f
                .debug_tuple("Memory")
                .field(&memory.file())
                .finish(),
            #[cfg(feature = "storage-sqlite")]
            Backend::Sqlite(sqlite) => f
                .debug_tuple("Sqlite")
                .field(&sqlite.namespace())
                .finish(),
        }
    }
}

#[async_trait]
impl StorageBackend for Backend {
    async fn get_all_service_statuses_with_result_pagination(
        &self,
        page: usize,
        page_size: usize,
    ) -> StorageResult<HashMap<String, ServiceStatus>> {
        self.inner()
            .get_all_service_statuses_with_result_pagination(page, page_size)
            .await
    }

    async fn get_service_status(
        &self,
        group: &str,
        name: &str,
    ) -> StorageResult<Option<ServiceStatus>> {
        self.inner().get_service_status(group, name).await
    }

    async fn get_service_status_by_key(&self, key: &str) -> StorageResult<Option<ServiceStatus>> {
        self.inner().get_service_status_by_key(key).await
    }

    async fn insert(&self, service: &Service, result: CheckResult) -> StorageResult<()> {
        self.inner().insert(service, result).await
    }

    async fn delete_all_service_statuses_not_in_keys(
        &self,
        keys: &[String],
    ) -> StorageResult<usize> {
        self.inner()
            .delete_all_service_statuses_not_in_keys(keys)
            .await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.inner().clear().await
    }

    async fn save(&self) -> StorageResult<()> {
        self.inner().save().await
    }
}
