//! Job scheduler trait for abstracting registration persistence.
//!
//! Implementations must deduplicate on `(job_name, file_id)`: registering
//! the same job twice returns the first registration unchanged.

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::job::ScheduledJob;

/// Persistence for recurring and one-shot sync registrations.
///
/// # Implementation Notes
///
/// Implementations should ensure:
/// - Idempotent registration keyed by job function and file id
/// - Atomic claiming with `SELECT FOR UPDATE SKIP LOCKED` semantics
/// - Claiming re-arms recurring jobs and removes one-shot jobs
pub trait JobScheduler: Send + Sync + Clone {
    /// Register the recurring sync for `file_id`, or return the existing one.
    fn register_recurring(
        &self,
        file_id: i64,
        interval: Duration,
    ) -> impl Future<Output = Result<ScheduledJob, AppError>> + Send;

    /// Queue a single immediate sync for `file_id`, or return the pending one.
    fn enqueue_once(
        &self,
        file_id: i64,
    ) -> impl Future<Output = Result<ScheduledJob, AppError>> + Send;

    /// Look up a registration by handle.
    fn get_job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Option<ScheduledJob>, AppError>> + Send;

    /// Remove a registration. Returns false if it did not exist.
    fn cancel(&self, job_id: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Claim up to `limit` due registrations.
    fn claim_due(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ScheduledJob>, AppError>> + Send;
}
