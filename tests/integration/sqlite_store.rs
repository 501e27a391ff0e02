//! Integration tests for the relational store
//!
//! These tests verify that:
//! - A status and its results are written in one transaction
//! - Rows read back match what was written
//! - Saves mirror the cache into the tables, including deletions
//! - A reopened store is hydrated from the tables
//! - A service that cannot be written does not hold back the others

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use status_store::Service;
use status_store::model::Uptime;
use status_store::storage::schema::{StoredResult, StoredServiceStatus};
use status_store::storage::{SqliteBackend, StorageBackend, StorageError};
use tempfile::tempdir;

use crate::helpers::*;

fn create_reference_status() -> StoredServiceStatus {
    StoredServiceStatus {
        name: "example.com".to_string(),
        group_name: "testing".to_string(),
        results: vec![StoredResult::from_check_result(
            "testing_example.com",
            &create_reference_result(),
        )],
        events: vec![],
        uptime: Uptime::default(),
    }
}

#[tokio::test]
async fn test_insert_and_find_round_trip() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool, "monitoring").await.unwrap();

    let status = create_reference_status();
    backend.insert_service_status(&status).await.unwrap();

    let found = backend
        .find_service_status("testing_example.com")
        .await
        .unwrap()
        .expect("status should be stored");

    assert_eq!(found.name, status.name);
    assert_eq!(found.group_name, status.group_name);
    assert_eq!(found.key(), "testing_example.com");
    assert_eq!(found.results.len(), 1);

    let mut result = found.results[0].clone();
    assert!(result.id.is_some());
    assert_eq!(result.service_key, "testing_example.com");
    assert_eq!(result.timestamp.timestamp(), 9000);
    assert_eq!(result.timestamp.timestamp_subsec_nanos(), 1);

    result.id = None;
    assert_eq!(result, status.results[0]);
}

#[tokio::test]
async fn test_failed_insert_leaves_nothing_behind() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    // two results with the same timestamp violate the results' unique constraint
    let mut status = create_reference_status();
    status.results.push(status.results[0].clone());

    let outcome = backend.insert_service_status(&status).await;
    assert!(matches!(outcome, Err(StorageError::QueryFailed(_))));

    assert_eq!(
        backend.find_service_status("testing_example.com").await.unwrap(),
        None
    );
    assert_eq!(count_rows(&pool, "monitoring__services").await, 0);
    assert_eq!(count_rows(&pool, "monitoring__results").await, 0);
}

#[tokio::test]
async fn test_duplicate_status_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    backend
        .insert_service_status(&create_reference_status())
        .await
        .unwrap();
    assert!(
        backend
            .insert_service_status(&create_reference_status())
            .await
            .is_err()
    );
    assert_eq!(count_rows(&pool, "monitoring__results").await, 1);
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let first = SqliteBackend::new(pool.clone(), "first").await.unwrap();
    let second = SqliteBackend::new(pool.clone(), "second").await.unwrap();

    first
        .insert_service_status(&create_reference_status())
        .await
        .unwrap();

    assert!(
        second
            .find_service_status("testing_example.com")
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(count_rows(&pool, "second__services").await, 0);
}

#[tokio::test]
async fn test_invalid_namespace_is_rejected() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;

    assert!(matches!(
        SqliteBackend::new(pool, "drop table").await,
        Err(StorageError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn test_save_writes_cached_statuses() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    let service = Service::new("core", "api");
    for i in 0..3 {
        backend.insert(&service, create_check_result_at(i, true)).await.unwrap();
    }

    // nothing is written before the save
    assert_eq!(count_rows(&pool, "monitoring__services").await, 0);

    backend.save().await.unwrap();

    let stored = backend.find_service_status("core_api").await.unwrap().unwrap();
    assert_eq!(stored.results.len(), 3);
    assert_eq!(
        stored.results[2].clone().into_check_result(),
        create_check_result_at(2, true)
    );
    assert_eq!(stored.events.len(), 2);
}

#[tokio::test]
async fn test_repeated_saves_rewrite_dirty_statuses() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    let service = Service::new("core", "api");
    backend.insert(&service, create_check_result_at(0, true)).await.unwrap();
    backend.save().await.unwrap();

    backend.insert(&service, create_check_result_at(1, false)).await.unwrap();
    backend.save().await.unwrap();
    backend.save().await.unwrap();

    assert_eq!(count_rows(&pool, "monitoring__services").await, 1);
    assert_eq!(count_rows(&pool, "monitoring__results").await, 2);
}

#[tokio::test]
async fn test_save_deletes_pruned_statuses_with_their_results() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    for name in ["a", "b", "c"] {
        backend
            .insert(&Service::new("core", name), create_check_result_at(0, true))
            .await
            .unwrap();
    }
    backend.save().await.unwrap();
    assert_eq!(count_rows(&pool, "monitoring__results").await, 3);

    let removed = backend
        .delete_all_service_statuses_not_in_keys(&[])
        .await
        .unwrap();
    assert_eq!(removed, 3);
    backend.save().await.unwrap();

    assert_eq!(count_rows(&pool, "monitoring__services").await, 0);
    assert_eq!(count_rows(&pool, "monitoring__results").await, 0);
}

#[tokio::test]
async fn test_save_after_clear_empties_tables() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    backend
        .insert(&Service::new("core", "api"), create_check_result_at(0, true))
        .await
        .unwrap();
    backend.save().await.unwrap();

    backend.clear().await.unwrap();
    backend.save().await.unwrap();

    assert_eq!(count_rows(&pool, "monitoring__services").await, 0);
    assert_eq!(count_rows(&pool, "monitoring__results").await, 0);
}

#[tokio::test]
async fn test_reopened_store_is_hydrated() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;

    {
        let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();
        let service = Service::new("core", "api");
        for i in 0..4 {
            backend
                .insert(&service, create_check_result_at(i, i < 2))
                .await
                .unwrap();
        }
        backend.save().await.unwrap();

        // never saved
        backend
            .insert(&Service::new("core", "web"), create_check_result_at(0, true))
            .await
            .unwrap();
    }

    let reopened = SqliteBackend::new(pool, "monitoring").await.unwrap();
    let status = reopened.get_service_status("core", "api").await.unwrap().unwrap();
    assert_eq!(status.results.len(), 4);
    assert_eq!(status.results[3], create_check_result_at(3, false));
    assert_eq!(status.events.len(), 3);
    assert!(reopened.get_service_status("core", "web").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reopened_store_reproduces_status_exactly() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let service = Service::new("core", "api");

    let cached = {
        let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();
        for result in create_one_in_eleven_results() {
            backend.insert(&service, result).await.unwrap();
        }
        backend.save().await.unwrap();
        backend.get_service_status("core", "api").await.unwrap().unwrap()
    };
    assert_eq!(cached.uptime.last_hour, 1.0 / 11.0);
    assert_eq!(cached.events.len(), 3);

    let reopened = SqliteBackend::new(pool, "monitoring").await.unwrap();
    let restored = reopened
        .get_service_status("core", "api")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored, cached);
}

#[tokio::test]
async fn test_unwritable_service_does_not_block_others() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    let healthy = Service::new("core", "healthy");
    backend
        .insert(&healthy, create_check_result_at(0, true))
        .await
        .unwrap();

    // beyond the range of nanosecond timestamps
    let far_future = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
    backend
        .insert(
            &Service::new("core", "broken"),
            create_check_result("example.org", far_future, true),
        )
        .await
        .unwrap();

    assert!(backend.save().await.is_err());
    assert_eq!(count_rows(&pool, "monitoring__services").await, 1);
    assert!(backend.find_service_status("core_healthy").await.unwrap().is_some());

    // later changes of the healthy service are still persisted
    backend
        .insert(&healthy, create_check_result_at(1, false))
        .await
        .unwrap();
    assert!(backend.save().await.is_err());

    let stored = backend.find_service_status("core_healthy").await.unwrap().unwrap();
    assert_eq!(stored.results.len(), 2);
    assert!(backend.find_service_status("core_broken").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_timestamps_do_not_fail_saves() {
    let temp_dir = tempdir().unwrap();
    let pool = create_test_pool(temp_dir.path()).await;
    let backend = SqliteBackend::new(pool.clone(), "monitoring").await.unwrap();

    backend
        .insert(&Service::new("core", "healthy"), create_check_result_at(0, true))
        .await
        .unwrap();
    let duplicated = Service::new("core", "duplicated");
    backend
        .insert(&duplicated, create_check_result_at(0, true))
        .await
        .unwrap();
    backend
        .insert(&duplicated, create_check_result_at(0, false))
        .await
        .unwrap();

    backend.save().await.unwrap();

    assert_eq!(count_rows(&pool, "monitoring__services").await, 2);
    assert_eq!(count_rows(&pool, "monitoring__results").await, 2);
}
