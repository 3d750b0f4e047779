//! Scoped mutual exclusion for sync runs.
//!
//! A run must hold the lock keyed by [`sync_lock_key`] before touching a
//! file's sync state. Acquisition waits at most the configured timeout and
//! then gives up: contention means another run is already in flight, and
//! the caller skips rather than queues.
//!
//! Guards release on every exit path. [`LockGuard::release`] is the normal
//! path; dropping a guard (early return, error, panic) releases as well.
//!
//! [`LocalSyncLock`] serves single-process deployments and tests. The
//! PostgreSQL advisory-lock implementation lives in `duva-db`.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::AppError;

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Lock key for a tracked file.
pub fn sync_lock_key(file_id: i64) -> String {
    format!("sync-lock:{}", file_id)
}

/// A named, process-spanning lock.
pub trait SyncLock: Send + Sync + Clone {
    type Guard: LockGuard;

    /// Try to take `key`, waiting up to `timeout`. `Ok(None)` means the lock
    /// is held elsewhere.
    fn acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<Self::Guard>, AppError>> + Send;
}

/// Proof of lock ownership.
pub trait LockGuard: Send {
    fn key(&self) -> &str;

    /// Release explicitly, surfacing any error from the backend.
    fn release(self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Retry `attempt` until it yields `Some` or `timeout` elapses.
///
/// Always tries at least once, so a zero timeout means "try once".
pub async fn retry_until<T, F, Fut>(timeout: Duration, mut attempt: F) -> Result<Option<T>, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AppError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = attempt().await? {
            return Ok(Some(value));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(RETRY_INTERVAL.min(deadline - now)).await;
    }
}

// =============================================================================
// In-process lock
// =============================================================================

/// A panic while the table is locked leaves the set itself consistent, so
/// poisoning is ignored.
fn lock_table(held: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process lock table.
#[derive(Debug, Clone, Default)]
pub struct LocalSyncLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LocalSyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        lock_table(&self.held).contains(key)
    }

    fn try_take(&self, key: &str) -> Option<LocalLockGuard> {
        let mut held = lock_table(&self.held);
        if held.insert(key.to_string()) {
            Some(LocalLockGuard {
                key: key.to_string(),
                held: Arc::clone(&self.held),
            })
        } else {
            None
        }
    }
}

impl SyncLock for LocalSyncLock {
    type Guard = LocalLockGuard;

    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Option<LocalLockGuard>, AppError> {
        retry_until(timeout, || async { Ok(self.try_take(key)) }).await
    }
}

/// Guard for [`LocalSyncLock`]; releases on drop.
#[derive(Debug)]
pub struct LocalLockGuard {
    key: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockGuard for LocalLockGuard {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(self) -> Result<(), AppError> {
        drop(self);
        Ok(())
    }
}

impl Drop for LocalLockGuard {
    fn drop(&mut self) {
        lock_table(&self.held).remove(&self.key);
    }
}
