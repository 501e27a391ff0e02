//! Lifecycle of the active storage backend
//!
//! The [`StorageSupervisor`] owns exactly one backend generation at a
//! time: the backend itself plus, if it has a durable medium, the
//! autosave actor saving it. The application creates one supervisor and
//! passes it to whatever needs storage.
//!
//! ## Replacement
//!
//! `initialize` never mutates a backend in place. It builds the new
//! backend first, then stops the old autosave actor and swaps the `Arc`.
//! Callers still holding the previous `Arc` finish their operations
//! against the previous, fully constructed backend.

use std::sync::Arc;

#[cfg(feature = "storage-sqlite")]
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::backend::{Backend, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::memory::MemoryBackend;
#[cfg(feature = "storage-sqlite")]
use super::sqlite::SqliteBackend;
use crate::actors::autosave::AutosaveHandle;
use crate::config::{ResolvedStorageConfig, StorageConfig};

/// One active backend and the actor saving it
struct Generation {
    backend: Arc<Backend>,
    autosave: Option<AutosaveHandle>,
}

/// Owner of the active storage backend
#[derive(Default)]
pub struct StorageSupervisor {
    active: RwLock<Option<Generation>>,

    /// Database used when a table namespace is configured
    #[cfg(feature = "storage-sqlite")]
    pool: Option<SqlitePool>,
}

impl StorageSupervisor {
    /// Create a supervisor without database access
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a supervisor that can activate the relational backend on `pool`
    #[cfg(feature = "storage-sqlite")]
    pub fn with_database(pool: SqlitePool) -> Self {
        Self {
            active: RwLock::new(None),
            pool: Some(pool),
        }
    }

    /// The active backend
    ///
    /// If nothing was initialized yet, an in-memory backend without
    /// persistence is activated first.
    pub async fn get(&self) -> Arc<Backend> {
        if let Some(generation) = self.active.read().await.as_ref() {
            return generation.backend.clone();
        }

        let mut active = self.active.write().await;
        if let Some(generation) = active.as_ref() {
            return generation.backend.clone();
        }

        warn!("storage requested before it was initialized, using an in-memory backend");
        let backend = Arc::new(Backend::Memory(MemoryBackend::in_memory()));
        *active = Some(Generation {
            backend: backend.clone(),
            autosave: None,
        });
        backend
    }

    /// Activate the backend described by `config`
    ///
    /// `None` selects the default configuration: in-memory, no
    /// persistence. On error the previously active backend stays active.
    #[instrument(skip(self))]
    pub async fn initialize(&self, config: Option<&StorageConfig>) -> StorageResult<()> {
        let resolved = config
            .cloned()
            .unwrap_or_default()
            .validate_and_set_defaults()?;

        let backend = Arc::new(self.create_backend(&resolved).await?);

        let mut active = self.active.write().await;
        if let Some(previous) = active.take() {
            if let Some(autosave) = previous.autosave {
                debug!("stopping autosave of the previous backend");
                autosave.stop().await;
            }
        }

        let autosave = backend.has_durable_medium().then(|| {
            debug!("autosaving every {:?}", resolved.auto_save_interval);
            AutosaveHandle::spawn(backend.clone(), resolved.auto_save_interval)
        });

        info!("activated storage backend: {:?}", backend);
        *active = Some(Generation { backend, autosave });
        Ok(())
    }

    /// Stop autosaving and save the active backend one last time
    pub async fn shutdown(&self) -> StorageResult<()> {
        let mut active = self.active.write().await;
        let Some(generation) = active.as_mut() else {
            return Ok(());
        };

        if let Some(autosave) = generation.autosave.take() {
            autosave.stop().await;
        }
        info!("saving before shutdown");
        generation.backend.save().await
    }

    pub async fn is_initialized(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Whether an autosave actor is running for the active backend
    pub async fn is_autosaving(&self) -> bool {
        self.active
            .read()
            .await
            .as_ref()
            .and_then(|generation| generation.autosave.as_ref())
            .is_some_and(|autosave| !autosave.is_finished())
    }

    async fn create_backend(&self, config: &ResolvedStorageConfig) -> StorageResult<Backend> {
        if let Some(namespace) = config.table_namespace.as_deref() {
            return self.create_relational_backend(namespace).await;
        }

        match config.file.as_ref() {
            Some(file) => {
                info!("creating storage backend with file={}", file.display());
                Ok(Backend::Memory(MemoryBackend::new(file).await?))
            }
            None => {
                info!("creating in-memory storage backend");
                Ok(Backend::Memory(MemoryBackend::in_memory()))
            }
        }
    }

    #[cfg(feature = "storage-sqlite")]
    async fn create_relational_backend(&self, namespace: &str) -> StorageResult<Backend> {
        let Some(pool) = self.pool.clone() else {
            return Err(StorageError::InvalidConfig(format!(
                "table namespace '{}' configured but no database connection was supplied",
                namespace
            )));
        };
        info!("creating storage backend with table namespace={}", namespace);
        Ok(Backend::Sqlite(SqliteBackend::new(pool, namespace).await?))
    }

    #[cfg(not(feature = "storage-sqlite"))]
    async fn create_relational_backend(&self, namespace: &str) -> StorageResult<Backend> {
        Err(StorageError::InvalidConfig(format!(
            "table namespace '{}' configured but database support is not compiled in",
            namespace
        )))
    }
}
