//! In-memory storage backend with optional file persistence
//!
//! All statuses live in a map guarded by a `RwLock`. If the backend was
//! created with a file path, the map is loaded from that file on
//! construction and written back on every `save()`.
//!
//! ## File Writes
//!
//! Saves serialize a snapshot to `<file>.tmp` next to the target and
//! rename it over the target, so the file is either the previous or the
//! new snapshot, never a partial one.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace};

use super::backend::StorageBackend;
use super::error::StorageResult;
use crate::model::{CheckResult, Service, ServiceStatus, convert_group_and_service_to_key};

/// In-memory storage backend
pub struct MemoryBackend {
    /// Statuses by service key
    statuses: RwLock<HashMap<String, ServiceStatus>>,

    /// Where `save()` persists to (None = no persistence)
    file: Option<PathBuf>,

    /// Serializes concurrent saves to the same file
    save_lock: Mutex<()>,
}

impl MemoryBackend {
    /// Create a backend without persistence
    pub fn in_memory() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            file: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Create a backend persisted to `file`
    ///
    /// Existing state is loaded from the file if it exists. An empty path
    /// behaves like [`MemoryBackend::in_memory`].
    #[instrument(skip_all)]
    pub async fn new(file: impl AsRef<Path>) -> StorageResult<Self> {
        let file = file.as_ref();
        if file.as_os_str().is_empty() {
            return Ok(Self::in_memory());
        }

        let statuses = match tokio::fs::read(file).await {
            Ok(bytes) => {
                let statuses: HashMap<String, ServiceStatus> = serde_json::from_slice(&bytes)?;
                info!(
                    "loaded {} service statuses from {}",
                    statuses.len(),
                    file.display()
                );
                statuses
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{} does not exist yet, starting empty", file.display());
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            statuses: RwLock::new(statuses),
            file: Some(file.to_path_buf()),
            save_lock: Mutex::new(()),
        })
    }

    /// The file this backend persists to, if any
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Copy of every stored status
    pub async fn snapshot(&self) -> HashMap<String, ServiceStatus> {
        self.statuses.read().await.clone()
    }

    /// Put a fully built status into the store, replacing any previous one
    pub async fn restore(&self, status: ServiceStatus) {
        self.statuses
            .write()
            .await
            .insert(status.key.clone(), status);
    }

    /// Number of stored services
    pub async fn len(&self) -> usize {
        self.statuses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.statuses.read().await.is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get_all_service_statuses_with_result_pagination(
        &self,
        page: usize,
        page_size: usize,
    ) -> StorageResult<HashMap<String, ServiceStatus>> {
        let statuses = self.statuses.read().await;
        Ok(statuses
            .iter()
            .map(|(key, status)| {
                (
                    key.clone(),
                    status.with_result_pagination(page, page_size),
                )
            })
            .collect())
    }

    async fn get_service_status(
        &self,
        group: &str,
        name: &str,
    ) -> StorageResult<Option<ServiceStatus>> {
        self.get_service_status_by_key(&convert_group_and_service_to_key(group, name))
            .await
    }

    async fn get_service_status_by_key(&self, key: &str) -> StorageResult<Option<ServiceStatus>> {
        Ok(self.statuses.read().await.get(key).cloned())
    }

    async fn insert(&self, service: &Service, result: CheckResult) -> StorageResult<()> {
        let key = service.key();
        trace!("inserting result for {}", key);

        let mut statuses = self.statuses.write().await;
        statuses
            .entry(key)
            .or_insert_with(|| ServiceStatus::new(service))
            .add_result(result);
        Ok(())
    }

    async fn delete_all_service_statuses_not_in_keys(
        &self,
        keys: &[String],
    ) -> StorageResult<usize> {
        let keep: HashSet<&str> = keys.iter().map(String::as_str).collect();

        let mut statuses = self.statuses.write().await;
        let before = statuses.len();
        statuses.retain(|key, _| keep.contains(key.as_str()));
        let removed = before - statuses.len();

        if removed > 0 {
            debug!("removed {} service statuses no longer monitored", removed);
        }
        Ok(removed)
    }

    async fn clear(&self) -> StorageResult<()> {
        self.statuses.write().await.clear();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn save(&self) -> StorageResult<()> {
        let Some(file) = self.file.as_ref() else {
            return Ok(());
        };

        let _guard = self.save_lock.lock().await;

        // serialize under the read lock, write without it
        let bytes = {
            let statuses = self.statuses.read().await;
            serde_json::to_vec(&*statuses)?
        };

        let mut tmp = file.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, file).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!("saved {} bytes to {}", bytes.len(), file.display());
        Ok(())
    }
}
