//! Integration tests for the storage supervisor
//!
//! These tests verify that:
//! - Re-initialization replaces the backend and its autosave actor
//! - A stopped autosave actor never touches its file again
//! - Shutdown persists the active backend
//! - Configuration errors leave the active backend in place

use std::sync::Arc;
use std::time::Duration;

use status_store::Service;
use status_store::config::StorageConfig;
use status_store::storage::{MemoryBackend, StorageBackend, StorageError, StorageSupervisor};
use tempfile::tempdir;

use crate::helpers::*;

fn file_config(path: &std::path::Path, interval_ms: i64) -> StorageConfig {
    StorageConfig {
        file: path.to_string_lossy().to_string(),
        auto_save_interval_ms: interval_ms,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_reinitialization_replaces_autosave() {
    let temp_dir = tempdir().unwrap();
    let file_a = temp_dir.path().join("a.json");
    let file_b = temp_dir.path().join("b.json");

    let supervisor = StorageSupervisor::new();
    supervisor
        .initialize(Some(&file_config(&file_a, 20)))
        .await
        .unwrap();
    assert!(supervisor.is_autosaving().await);

    let first = supervisor.get().await;
    first
        .insert(&Service::new("core", "api"), create_check_result_at(0, true))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(file_a.exists());

    supervisor
        .initialize(Some(&file_config(&file_b, 20)))
        .await
        .unwrap();
    assert!(supervisor.is_autosaving().await);
    assert!(!Arc::ptr_eq(&first, &supervisor.get().await));

    std::fs::remove_file(&file_a).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(!file_a.exists(), "the replaced autosave actor is still running");
    assert!(file_b.exists());

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_memory_only_config_does_not_autosave() {
    let supervisor = StorageSupervisor::new();
    supervisor
        .initialize(Some(&StorageConfig::default()))
        .await
        .unwrap();

    assert!(supervisor.is_initialized().await);
    assert!(!supervisor.is_autosaving().await);
    assert!(!supervisor.get().await.has_durable_medium());
}

#[tokio::test]
async fn test_shutdown_saves_active_backend() {
    let temp_dir = tempdir().unwrap();
    let file = temp_dir.path().join("statuses.json");

    let supervisor = StorageSupervisor::new();
    // long enough to never tick during the test
    supervisor
        .initialize(Some(&file_config(&file, 3_600_000)))
        .await
        .unwrap();
    supervisor
        .get()
        .await
        .insert(&Service::new("core", "api"), create_check_result_at(0, true))
        .await
        .unwrap();
    assert!(!file.exists());

    supervisor.shutdown().await.unwrap();
    assert!(!supervisor.is_autosaving().await);

    let reloaded = MemoryBackend::new(&file).await.unwrap();
    assert_eq!(reloaded.len().await, 1);
}

#[tokio::test]
async fn test_file_state_is_loaded_on_initialize() {
    let temp_dir = tempdir().unwrap();
    let file = temp_dir.path().join("statuses.json");

    let seeded = MemoryBackend::new(&file).await.unwrap();
    seeded
        .insert(&Service::new("core", "api"), create_check_result_at(0, false))
        .await
        .unwrap();
    seeded.save().await.unwrap();

    let supervisor = StorageSupervisor::new();
    supervisor
        .initialize(Some(&file_config(&file, 0)))
        .await
        .unwrap();

    let status = supervisor
        .get()
        .await
        .get_service_status("core", "api")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.results.len(), 1);
    assert!(!status.results[0].success);

    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_corrupt_file_keeps_previous_backend() {
    let temp_dir = tempdir().unwrap();
    let good = temp_dir.path().join("good.json");
    let corrupt = temp_dir.path().join("corrupt.json");
    std::fs::write(&corrupt, b"{").unwrap();

    let supervisor = StorageSupervisor::new();
    supervisor
        .initialize(Some(&file_config(&good, 3_600_000)))
        .await
        .unwrap();
    let before = supervisor.get().await;

    assert!(matches!(
        supervisor.initialize(Some(&file_config(&corrupt, 0))).await,
        Err(StorageError::SerializationError(_))
    ));
    assert!(Arc::ptr_eq(&before, &supervisor.get().await));
    assert!(supervisor.is_autosaving().await);

    supervisor.shutdown().await.unwrap();
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_namespace_selects_relational_backend() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let config = StorageConfig {
        table_namespace: "monitoring".to_string(),
        auto_save_interval_ms: 3_600_000,
        ..Default::default()
    };

    let supervisor = StorageSupervisor::with_database(pool.clone());
    supervisor.initialize(Some(&config)).await.unwrap();
    assert!(supervisor.is_autosaving().await);

    supervisor
        .get()
        .await
        .insert(&Service::new("core", "api"), create_check_result_at(0, true))
        .await
        .unwrap();
    supervisor.shutdown().await.unwrap();
    assert_eq!(count_rows(&pool, "monitoring__services").await, 1);

    let restarted = StorageSupervisor::with_database(pool);
    restarted.initialize(Some(&config)).await.unwrap();
    assert!(
        restarted
            .get()
            .await
            .get_service_status("core", "api")
            .await
            .unwrap()
            .is_some()
    );
    restarted.shutdown().await.unwrap();
}
