//! Cross-process sync lock on PostgreSQL advisory locks.
//!
//! Advisory locks are owned by the session that took them, so every guard
//! pins its own pooled connection. Releasing unlocks and hands the
//! connection back to the pool. A guard dropped without `release()` detaches
//! its connection and closes it, which makes the server drop the lock.

use std::time::Duration;

use duva_core::error::AppError;
use duva_core::lock::{LockGuard, SyncLock};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio::time::Instant;

const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// [`SyncLock`] backed by `pg_try_advisory_lock(hashtext(key))`.
#[derive(Clone)]
pub struct PgSyncLock {
    pool: PgPool,
}

impl PgSyncLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn try_lock(conn: &mut PoolConnection<Postgres>, key: &str) -> Result<bool, AppError> {
    let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock(hashtext($1))")
        .bind(key)
        .fetch_one(&mut **conn)
        .await?;
    Ok(locked)
}

impl SyncLock for PgSyncLock {
    type Guard = PgLockGuard;

    async fn acquire(&self, key: &str, timeout: Duration) -> Result<Option<PgLockGuard>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let deadline = Instant::now() + timeout;

        loop {
            if try_lock(&mut conn, key).await? {
                tracing::debug!(key, "Advisory lock acquired");
                return Ok(Some(PgLockGuard {
                    key: key.to_string(),
                    conn: Some(conn),
                }));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RETRY_INTERVAL.min(deadline - now)).await;
        }
    }
}

/// Holds the session that owns an advisory lock.
pub struct PgLockGuard {
    key: String,
    conn: Option<PoolConnection<Postgres>>,
}

impl LockGuard for PgLockGuard {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(mut self) -> Result<(), AppError> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let unlocked: Result<(bool,), sqlx::Error> =
            sqlx::query_as("SELECT pg_advisory_unlock(hashtext($1))")
                .bind(&self.key)
                .fetch_one(&mut *conn)
                .await;

        match unlocked {
            Ok((true,)) => Ok(()),
            Ok((false,)) => {
                // The session did not hold it; do not recycle a confused connection.
                drop(conn.detach());
                Err(AppError::Generic(format!("advisory lock {} was not held", self.key)))
            }
            Err(e) => {
                drop(conn.detach());
                Err(e.into())
            }
        }
    }
}

impl Drop for PgLockGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!(key = %self.key, "Lock guard dropped, closing its session");
            drop(conn.detach());
        }
    }
}
