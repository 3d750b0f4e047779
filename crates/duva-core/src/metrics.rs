//! Success/failure counters and error reporting.
//!
//! A [`FailureSink`] is a pure side channel: nothing it does affects the
//! outcome of a run. Swallowed errors, such as a publish failure after the
//! extract is safely stored, are only visible here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, info, warn};

use crate::error::AppError;

/// Receives run outcomes and captured errors.
///
/// Default implementations do nothing.
pub trait FailureSink: Send + Sync {
    fn record_success(&self, file_id: i64) {
        let _ = file_id;
    }

    fn record_failure(&self, file_id: i64, error: &AppError) {
        let _ = (file_id, error);
    }

    /// Report an error that did not change the run's outcome.
    fn capture(&self, file_id: i64, context: &'static str, error: &AppError) {
        let _ = (file_id, context, error);
    }
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentFailureSink;

impl FailureSink for SilentFailureSink {}

/// Snapshot of [`TracingFailureSink`] counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkCounters {
    pub successes: u64,
    pub failures: u64,
    pub captured: u64,
}

/// Logs every event through `tracing` and keeps running totals.
#[derive(Debug, Default, Clone)]
pub struct TracingFailureSink {
    successes: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
    captured: Arc<AtomicU64>,
}

impl TracingFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> SinkCounters {
        SinkCounters {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            captured: self.captured.load(Ordering::Relaxed),
        }
    }
}

impl FailureSink for TracingFailureSink {
    fn record_success(&self, file_id: i64) {
        let total = self.successes.fetch_add(1, Ordering::Relaxed) + 1;
        info!(file_id, successful_syncs = total, "Sync succeeded");
    }

    fn record_failure(&self, file_id: i64, err: &AppError) {
        let total = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(file_id, failed_syncs = total, error = %err, "Sync failed");
    }

    fn capture(&self, file_id: i64, context: &'static str, err: &AppError) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        error!(file_id, context, error = %err, "Captured error");
    }
}

impl<T: FailureSink + ?Sized> FailureSink for Arc<T> {
    fn record_success(&self, file_id: i64) {
        (**self).record_success(file_id)
    }

    fn record_failure(&self, file_id: i64, error: &AppError) {
        (**self).record_failure(file_id, error)
    }

    fn capture(&self, file_id: i64, context: &'static str, error: &AppError) {
        (**self).capture(file_id, context, error)
    }
}
