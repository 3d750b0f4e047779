//! Scheduler worker: claims due sync jobs and runs them.
//!
//! # Architecture
//!
//! The worker follows a poll-based model:
//! ```text
//! schedule_all_active()            (once, optional)
//! loop {
//!     1. Check for cancellation
//!     2. Claim due registrations (SELECT FOR UPDATE SKIP LOCKED)
//!     3. Run each through SyncService::run_sync, concurrently
//!     4. If nothing was due, sleep for poll_interval
//! }
//! ```
//!
//! Claiming re-arms recurring jobs before they run, so a worker that dies
//! mid-run loses nothing: the next tick runs the file again. Runs for the
//! same file never overlap; the per-file sync lock turns a duplicate into
//! [`SyncOutcome::Skipped`].
//!
//! # Graceful Shutdown
//!
//! On cancellation the worker stops claiming and lets the current batch
//! finish. Sync runs are not preempted.
//!
//! # Example
//!
//! ```ignore
//! use duva_core::worker::{SchedulerWorker, TracingWorkerReporter};
//! use duva_core::job::WorkerConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! let worker = SchedulerWorker::new(sync_service, WorkerConfig::default());
//! let cancel = CancellationToken::new();
//!
//! worker.run(cancel, &TracingWorkerReporter).await?;
//! ```

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::job::{ScheduledJob, WorkerConfig};
use crate::orchestrator::{SyncService, SyncStack};
use crate::scheduler::JobScheduler;
use crate::sync::{SyncOutcome, SyncStats};

// =============================================================================
// Worker Events
// =============================================================================

/// Events emitted by the worker during operation.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    /// Worker started and is ready to process jobs.
    Started { worker_id: &'a str },
    /// Active files without a job were scheduled at start-up.
    Scheduled { count: usize },
    /// Worker is polling for due jobs.
    Polling,
    /// Worker claimed a job.
    JobClaimed { job: &'a ScheduledJob },
    /// The sync run finished, whatever its outcome.
    JobCompleted {
        job: &'a ScheduledJob,
        outcome: &'a SyncOutcome,
    },
    /// The run could not be carried out at all.
    JobFailed {
        job: &'a ScheduledJob,
        error: &'a str,
    },
    /// Worker is shutting down.
    ShuttingDown {
        worker_id: &'a str,
        stats: &'a SyncStats,
    },
    /// Worker stopped.
    Stopped { worker_id: &'a str },
}

// =============================================================================
// Worker Reporter Trait
// =============================================================================

/// Trait for reporting worker events.
pub trait WorkerReporter: Send + Sync {
    /// Called when a worker event occurs.
    ///
    /// The default implementation does nothing (silent mode).
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Silent worker reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentWorkerReporter;

impl WorkerReporter for SilentWorkerReporter {}

/// Tracing-based worker reporter for CLI/server logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                info!(worker_id, "Worker started");
            }
            WorkerEvent::Scheduled { count } => {
                info!(count, "Scheduled active files");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for due jobs...");
            }
            WorkerEvent::JobClaimed { job } => {
                info!(job_id = %job.id, job = %job.job_name, file_id = job.file_id, "Job claimed");
            }
            WorkerEvent::JobCompleted { job, outcome } => match outcome {
                SyncOutcome::Failed { reason } => {
                    warn!(job_id = %job.id, file_id = job.file_id, %reason, "Sync failed");
                }
                other => {
                    info!(job_id = %job.id, file_id = job.file_id, outcome = %other, "Job completed");
                }
            },
            WorkerEvent::JobFailed { job, error } => {
                error!(job_id = %job.id, file_id = job.file_id, %error, "Job failed");
            }
            WorkerEvent::ShuttingDown { worker_id, stats } => {
                info!(
                    worker_id,
                    available = stats.available,
                    unavailable = stats.unavailable,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    "Worker shutting down"
                );
            }
            WorkerEvent::Stopped { worker_id } => {
                info!(worker_id, "Worker stopped");
            }
        }
    }
}

// =============================================================================
// Scheduler Worker
// =============================================================================

/// Worker that runs due sync jobs until cancelled.
pub struct SchedulerWorker<K: SyncStack> {
    service: SyncService<K>,
    config: WorkerConfig,
}

impl<K: SyncStack> SchedulerWorker<K> {
    pub fn new(service: SyncService<K>, config: WorkerConfig) -> Self {
        Self { service, config }
    }

    /// Run the worker until cancelled. Returns totals over the worker's life.
    pub async fn run<WR>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<SyncStats, AppError>
    where
        WR: WorkerReporter,
    {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        if self.config.schedule_all_active {
            match self.service.lifecycle().schedule_all_active().await {
                Ok(count) => reporter.report(WorkerEvent::Scheduled { count }),
                Err(e) => error!(error = %e, "Failed to schedule active files"),
            }
        }

        let mut stats = SyncStats::new();
        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.run_once(reporter).await {
                Ok(batch) if batch.total() > 0 => merge(&mut stats, &batch),
                Ok(_) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to claim jobs");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        _ = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            stats: &stats,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(stats)
    }

    /// Claim one batch of due jobs and run them.
    pub async fn run_once<WR>(&self, reporter: &WR) -> Result<SyncStats, AppError>
    where
        WR: WorkerReporter,
    {
        let jobs = self
            .service
            .lifecycle()
            .scheduler()
            .claim_due(self.config.batch_size)
            .await?;

        let outcomes = join_all(jobs.iter().map(|job| self.process_job(job, reporter))).await;

        let mut stats = SyncStats::new();
        for outcome in outcomes.iter().flatten() {
            stats.record(outcome);
        }
        Ok(stats)
    }

    async fn process_job<WR>(&self, job: &ScheduledJob, reporter: &WR) -> Option<SyncOutcome>
    where
        WR: WorkerReporter,
    {
        reporter.report(WorkerEvent::JobClaimed { job });

        match self.service.run_sync(job.file_id).await {
            Ok(outcome) => {
                reporter.report(WorkerEvent::JobCompleted {
                    job,
                    outcome: &outcome,
                });
                Some(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                reporter.report(WorkerEvent::JobFailed {
                    job,
                    error: &message,
                });
                if matches!(e, AppError::NotFound(_)) {
                    // The file is gone; drop its registration.
                    if let Err(e) = self.service.lifecycle().scheduler().cancel(&job.id).await {
                        error!(job_id = %job.id, error = %e, "Failed to cancel orphaned job");
                    }
                }
                None
            }
        }
    }
}

fn merge(total: &mut SyncStats, batch: &SyncStats) {
    total.available += batch.available;
    total.unavailable += batch.unavailable;
    total.failed += batch.failed;
    total.skipped += batch.skipped;
    total.rows += batch.rows;
}
