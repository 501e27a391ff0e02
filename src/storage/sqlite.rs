//! SQLite storage backend implementation
//!
//! This module provides the relational implementation of the
//! `StorageBackend` trait. See [`super::schema`] for how a status is laid
//! out over the `<namespace>__services` and `<namespace>__results` tables.
//!
//! ## Consistency
//!
//! The backend is a write-through cache with deferred flush:
//!
//! - On construction every stored status is loaded into a
//!   [`MemoryBackend`] cache.
//! - Reads, inserts, deletions and `clear` act on the cache; inserted keys
//!   are marked dirty.
//! - `save()` reconciles the database with the cache in one transaction:
//!   rows of services that are no longer cached are deleted, dirty
//!   services are rewritten, each in its own savepoint. A service that
//!   cannot be written stays dirty without holding back the others.
//!
//! A crash therefore loses at most the changes since the last save, the
//! same guarantee the file-backed memory store gives.
//!
//! ## Requirements
//!
//! Connections must enforce foreign keys (`PRAGMA foreign_keys = ON`),
//! otherwise deleting a service would not cascade to its results.
//! [`SqliteBackend::connect`] configures this.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Connection, Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use super::backend::StorageBackend;
use super::error::{StorageError, StorageResult};
use super::memory::MemoryBackend;
use super::schema::{
    StoredResult, StoredServiceStatus, create_results_index, create_results_table,
    create_services_table, decode_json_array, decode_text_array, duration_to_nanos,
    encode_json_array, encode_text_array, nanos_to_duration, nanos_to_timestamp,
    timestamp_to_nanos,
};
use crate::model::{CheckResult, Service, ServiceStatus, Uptime};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: SqlitePool,
    namespace: String,

    /// Authoritative state between saves
    cache: MemoryBackend,

    /// Keys inserted into since the last successful save
    dirty: Mutex<HashSet<String>>,

    /// Serializes saves
    flush_lock: Mutex<()>,
}

impl SqliteBackend {
    /// Open a connection pool for a SQLite database file
    ///
    /// The database is created if missing and configured with WAL
    /// journaling and foreign key enforcement.
    #[instrument(skip_all)]
    pub async fn connect(db_path: impl AsRef<Path>) -> StorageResult<SqlitePool> {
        let db_path = db_path.as_ref();
        info!("opening SQLite database at: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .foreign_keys(true);

        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))
    }

    /// Create a backend storing its tables under `namespace`
    ///
    /// This will:
    /// 1. Reject an empty or non-identifier namespace
    /// 2. Create the tables and the index if they don't exist
    /// 3. Load every stored status into the cache
    #[instrument(skip(pool))]
    pub async fn new(pool: SqlitePool, namespace: &str) -> StorageResult<Self> {
        validate_namespace(namespace)?;

        let backend = Self {
            pool,
            namespace: namespace.to_string(),
            cache: MemoryBackend::in_memory(),
            dirty: Mutex::new(HashSet::new()),
            flush_lock: Mutex::new(()),
        };

        backend.create_tables().await?;
        backend.load_cache().await?;

        info!(
            "SQLite backend ready with {} cached service statuses",
            backend.cache.len().await
        );
        Ok(backend)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the services table
    pub fn services_table(&self) -> String {
        format!("{}__services", self.namespace)
    }

    /// Name of the results table
    pub fn results_table(&self) -> String {
        format!("{}__results", self.namespace)
    }

    /// Insert a status and all of its results in one transaction
    ///
    /// Fails if a status with the same key is already stored. Nothing of
    /// the status is persisted unless every row was written.
    #[instrument(skip(self, status), fields(key = %status.key()))]
    pub async fn insert_service_status(&self, status: &StoredServiceStatus) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        match self.write_service_status(&mut tx, status).await {
            Ok(()) => {
                tx.commit().await?;
                debug!("inserted service status with {} results", status.results.len());
                Ok(())
            }
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    /// Read a status and its results back from the database
    #[instrument(skip(self))]
    pub async fn find_service_status(
        &self,
        key: &str,
    ) -> StorageResult<Option<StoredServiceStatus>> {
        let select = format!(
            r#"
            SELECT name, group_name, events_json, uptime_json
            FROM {}
            WHERE key = ?
            "#,
            self.services_table()
        );

        let Some(row) = sqlx::query(&select)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("cannot select service status: {}", e)))?
        else {
            return Ok(None);
        };

        let events_json: String = row.try_get("events_json")?;
        let uptime_json: String = row.try_get("uptime_json")?;
        let uptime: Uptime = serde_json::from_str(&uptime_json)?;

        let status = StoredServiceStatus {
            name: row.try_get("name")?,
            group_name: row.try_get("group_name")?,
            results: self.find_results(key).await?,
            events: decode_json_array(&events_json)?,
            uptime,
        };

        Ok(Some(status))
    }

    async fn create_tables(&self) -> StorageResult<()> {
        let services_table = self.services_table();
        let results_table = self.results_table();

        let statements = [
            ("services table", create_services_table(&services_table)),
            (
                "results table",
                create_results_table(&results_table, &services_table),
            ),
            ("results index", create_results_index(&results_table)),
        ];

        for (what, ddl) in statements {
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::SchemaFailed(format!("{}: {}", what, e)))?;
        }

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&self.pool)
            .await?;
        if foreign_keys != 1 {
            return Err(StorageError::SchemaFailed(
                "foreign key enforcement is disabled on the connection".to_string(),
            ));
        }

        debug!("tables {} and {} are ready", services_table, results_table);
        Ok(())
    }

    async fn load_cache(&self) -> StorageResult<()> {
        let keys: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT key FROM {} ORDER BY key",
            self.services_table()
        ))
        .fetch_all(&self.pool)
        .await?;

        for key in keys {
            if let Some(stored) = self.find_service_status(&key).await? {
                self.cache.restore(stored.into_service_status()).await;
            }
        }
        Ok(())
    }

    async fn write_service_status(
        &self,
        conn: &mut SqliteConnection,
        status: &StoredServiceStatus,
    ) -> StorageResult<()> {
        let key = status.key();
        let events_json = encode_json_array(&status.events)?;
        let uptime_json = serde_json::to_string(&status.uptime)?;

        let insert = format!(
            r#"
            INSERT INTO {} (key, name, group_name, events_json, uptime_json)
            VALUES (?, ?, ?, ?, ?)
            "#,
            self.services_table()
        );

        let affected = sqlx::query(&insert)
            .bind(&key)
            .bind(&status.name)
            .bind(&status.group_name)
            .bind(events_json)
            .bind(uptime_json)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("cannot insert service status: {}", e)))?
            .rows_affected();
        if affected != 1 {
            return Err(StorageError::UnexpectedRowCount {
                expected: 1,
                actual: affected,
            });
        }

        for result in &status.results {
            self.insert_result(&mut *conn, &key, result).await?;
        }
        Ok(())
    }

    async fn insert_result(
        &self,
        conn: &mut SqliteConnection,
        service_key: &str,
        result: &StoredResult,
    ) -> StorageResult<()> {
        let insert = format!(
            r#"
            INSERT INTO {} (
                service_key, hostname, timestamp_ns, duration_ns,
                http_status, conditions_json, errors, success
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            self.results_table()
        );

        let affected = sqlx::query(&insert)
            .bind(service_key)
            .bind(&result.hostname)
            .bind(timestamp_to_nanos(&result.timestamp)?)
            .bind(duration_to_nanos(&result.duration)?)
            .bind(i32::from(result.http_status))
            .bind(encode_json_array(&result.condition_results)?)
            .bind(encode_text_array(&result.errors)?)
            .bind(result.success)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("cannot insert result: {}", e)))?
            .rows_affected();
        if affected != 1 {
            return Err(StorageError::UnexpectedRowCount {
                expected: 1,
                actual: affected,
            });
        }
        Ok(())
    }

    async fn find_results(&self, service_key: &str) -> StorageResult<Vec<StoredResult>> {
        let select = format!(
            r#"
            SELECT id, service_key, hostname, timestamp_ns, duration_ns,
                   http_status, conditions_json, errors, success
            FROM {}
            WHERE service_key = ?
            ORDER BY id ASC
            "#,
            self.results_table()
        );

        let rows = sqlx::query(&select)
            .bind(service_key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(format!("cannot select results: {}", e)))?;

        rows.into_iter()
            .map(|row| -> StorageResult<StoredResult> {
                let http_status: i64 = row.try_get("http_status")?;
                let conditions_json: String = row.try_get("conditions_json")?;
                let errors: String = row.try_get("errors")?;

                Ok(StoredResult {
                    id: Some(row.try_get("id")?),
                    service_key: row.try_get("service_key")?,
                    hostname: row.try_get("hostname")?,
                    timestamp: nanos_to_timestamp(row.try_get("timestamp_ns")?),
                    duration: nanos_to_duration(row.try_get("duration_ns")?)?,
                    http_status: u16::try_from(http_status).map_err(|_| {
                        StorageError::SerializationError(format!(
                            "invalid HTTP status: {}",
                            http_status
                        ))
                    })?,
                    condition_results: decode_json_array(&conditions_json)?,
                    errors: decode_text_array(&errors)?,
                    success: row.try_get("success")?,
                })
            })
            .collect()
    }

    async fn delete_service(&self, conn: &mut SqliteConnection, key: &str) -> StorageResult<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE key = ?", self.services_table()))
            .bind(key)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Make the database mirror `snapshot`, rewriting the `dirty` services
    ///
    /// Every dirty service is rewritten inside its own savepoint. A service
    /// that cannot be written keeps its previous rows and is returned with
    /// its error; the other services are still written.
    async fn reconcile(
        &self,
        conn: &mut SqliteConnection,
        dirty: &HashSet<String>,
        snapshot: &HashMap<String, ServiceStatus>,
    ) -> StorageResult<Vec<(String, StorageError)>> {
        let stored_keys: Vec<String> =
            sqlx::query_scalar(&format!("SELECT key FROM {}", self.services_table()))
                .fetch_all(&mut *conn)
                .await?;

        let mut removed = 0;
        for key in stored_keys.iter().filter(|key| !snapshot.contains_key(*key)) {
            self.delete_service(&mut *conn, key).await?;
            removed += 1;
        }

        let mut rewritten = 0;
        let mut failed = Vec::new();
        for key in dirty {
            let Some(status) = snapshot.get(key) else {
                continue;
            };

            let mut savepoint = conn.begin().await?;
            let outcome = match self.delete_service(&mut savepoint, key).await {
                Ok(()) => {
                    self.write_service_status(
                        &mut savepoint,
                        &StoredServiceStatus::from_service_status(status),
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    savepoint.commit().await?;
                    rewritten += 1;
                }
                Err(e) => {
                    rollback(savepoint).await;
                    error!("cannot save service status {}: {}", key, e);
                    failed.push((key.clone(), e));
                }
            }
        }

        debug!(
            "reconciled database: {} removed, {} rewritten, {} failed",
            removed,
            rewritten,
            failed.len()
        );
        Ok(failed)
    }
}

/// Roll back a failed transaction, keeping the original error for the caller
async fn rollback(tx: Transaction<'_, Sqlite>) {
    if let Err(e) = tx.rollback().await {
        warn!("rollback failed: {}", e);
    }
}

fn validate_namespace(namespace: &str) -> StorageResult<()> {
    let mut chars = namespace.chars();
    let Some(first) = chars.next() else {
        return Err(StorageError::InvalidConfig(
            "table namespace can't be empty".to_string(),
        ));
    };
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StorageError::InvalidConfig(format!(
            "table namespace '{}' must only contain letters, digits and underscores",
            namespace
        )));
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get_all_service_statuses_with_result_pagination(
        &self,
        page: usize,
        page_size: usize,
    ) -> StorageResult<HashMap<String, ServiceStatus>> {
        self.cache
            .get_all_service_statuses_with_result_pagination(page, page_size)
            .await
    }

    async fn get_service_status(
        &self,
        group: &str,
        name: &str,
    ) -> StorageResult<Option<ServiceStatus>> {
        self.cache.get_service_status(group, name).await
    }

    async fn get_service_status_by_key(&self, key: &str) -> StorageResult<Option<ServiceStatus>> {
        self.cache.get_service_status_by_key(key).await
    }

    async fn insert(&self, service: &Service, result: CheckResult) -> StorageResult<()> {
        self.cache.insert(service, result).await?;
        self.dirty.lock().await.insert(service.key());
        Ok(())
    }

    async fn delete_all_service_statuses_not_in_keys(
        &self,
        keys: &[String],
    ) -> StorageResult<usize> {
        self.cache
            .delete_all_service_statuses_not_in_keys(keys)
            .await
    }

    async fn clear(&self) -> StorageResult<()> {
        // hold the dirty set so a concurrent insert is either cleared or marked
        let mut dirty = self.dirty.lock().await;
        self.cache.clear().await?;
        dirty.clear();
        Ok(())
    }

    #[instrument(skip(self), fields(namespace = %self.namespace))]
    async fn save(&self) -> StorageResult<()> {
        let _guard = self.flush_lock.lock().await;

        // drain before the snapshot: a key marked afterwards is saved again next time
        let dirty = std::mem::take(&mut *self.dirty.lock().await);
        let snapshot = self.cache.snapshot().await;
        trace!(
            "saving {} cached statuses ({} dirty)",
            snapshot.len(),
            dirty.len()
        );

        let mut tx = self.pool.begin().await?;
        let failed = match self.reconcile(&mut tx, &dirty, &snapshot).await {
            Ok(failed) => match tx.commit().await {
                Ok(()) => failed,
                Err(e) => {
                    self.dirty.lock().await.extend(dirty);
                    return Err(e.into());
                }
            },
            Err(e) => {
                rollback(tx).await;
                self.dirty.lock().await.extend(dirty);
                return Err(e);
            }
        };

        // only the services that could not be written are retried
        let Some((_, first_error)) = failed.first() else {
            return Ok(());
        };
        let message = format!(
            "{} service status(es) could not be saved, first error: {}",
            failed.len(),
            first_error
        );
        self.dirty
            .lock()
            .await
            .extend(failed.into_iter().map(|(key, _)| key));
        Err(StorageError::QueryFailed(message))
    }
}
