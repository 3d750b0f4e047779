//! Integration tests for PgSyncLock.

use std::time::Duration;

use duva_core::lock::{LockGuard, SyncLock, sync_lock_key};
use duva_db::PgSyncLock;

use crate::integration::common::setup_test_db;

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_lock_is_exclusive_until_released() {
    let (pool, _container) = setup_test_db().await;
    let lock = PgSyncLock::new(pool);
    let key = sync_lock_key(1);

    let guard = lock.acquire(&key, Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(guard.key(), key);
    assert!(lock.acquire(&key, Duration::ZERO).await.unwrap().is_none());
    assert!(
        lock.acquire(&sync_lock_key(2), Duration::ZERO)
            .await
            .unwrap()
            .is_some()
    );

    guard.release().await.unwrap();
    assert!(lock.acquire(&key, Duration::ZERO).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_dropped_guard_frees_lock() {
    let (pool, _container) = setup_test_db().await;
    let lock = PgSyncLock::new(pool);
    let key = sync_lock_key(1);

    {
        let _guard = lock.acquire(&key, Duration::ZERO).await.unwrap().unwrap();
    }

    // The detached session closes asynchronously on the server side.
    let reacquired = lock.acquire(&key, Duration::from_secs(5)).await.unwrap();
    assert!(reacquired.is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_acquire_waits_for_release() {
    let (pool, _container) = setup_test_db().await;
    let lock = PgSyncLock::new(pool);
    let key = sync_lock_key(1);
    let guard = lock.acquire(&key, Duration::ZERO).await.unwrap().unwrap();

    let contender = lock.clone();
    let waiting_key = key.clone();
    let handle = tokio::spawn(async move {
        contender
            .acquire(&waiting_key, Duration::from_secs(5))
            .await
            .unwrap()
            .is_some()
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    guard.release().await.unwrap();

    assert!(handle.await.unwrap());
}
