//! Scheduler types for recurring and one-shot sync jobs.
//!
//! # Architecture
//!
//! Each tracked file has at most one recurring registration and at most one
//! pending one-shot registration. Both are deduplicated on
//! `(job_name, file_id)`:
//! ```text
//! register_recurring(file) ──► sync_file        every `interval`
//! enqueue_once(file)       ──► sync_file_once   next worker poll, then removed
//! ```
//! Workers claim due registrations; claiming re-arms a recurring job
//! (`next_run_at += interval`) and removes a one-shot job, so a crashed
//! worker never leaves a registration stuck.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job function name for the recurring sync.
pub const RECURRING_SYNC_JOB: &str = "sync_file";

/// Job function name for a manually requested sync.
pub const ONE_SHOT_SYNC_JOB: &str = "sync_file_once";

// =============================================================================
// Scheduled Job
// =============================================================================

/// A scheduler registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Opaque handle stored in the tracked file's metadata.
    pub id: String,
    pub job_name: String,
    pub file_id: i64,
    /// `None` for one-shot jobs.
    pub interval: Option<Duration>,
    pub next_run_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// A recurring registration whose first run is one interval from now.
    pub fn recurring(file_id: i64, interval: Duration) -> Self {
        let delta = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero());
        Self {
            id: Uuid::new_v4().to_string(),
            job_name: RECURRING_SYNC_JOB.to_string(),
            file_id,
            interval: Some(interval),
            next_run_at: Utc::now() + delta,
        }
    }

    /// A one-shot registration due immediately.
    pub fn once(file_id: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_name: ONE_SHOT_SYNC_JOB.to_string(),
            file_id,
            interval: None,
            next_run_at: Utc::now(),
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.interval.is_some()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at <= now
    }
}

// =============================================================================
// Worker Configuration
// =============================================================================

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Unique worker identifier.
    pub worker_id: String,
    /// How often to poll for due jobs.
    pub poll_interval: std::time::Duration,
    /// Maximum jobs claimed per poll.
    pub batch_size: u32,
    /// Schedule every active file without a job before the first poll.
    pub schedule_all_active: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            poll_interval: std::time::Duration::from_secs(5),
            batch_size: 4,
            schedule_all_active: true,
        }
    }
}

impl WorkerConfig {
    /// Set the worker ID.
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn without_startup_scheduling(mut self) -> Self {
        self.schedule_all_active = false;
        self
    }
}
