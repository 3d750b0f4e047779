//! Job lifecycle: recurring schedules, failure counting and auto-deactivation.
//!
//! The recurring job handle and the consecutive-failure counter live in the
//! tracked file's [`JobMetadata`]. Every completed run reports back through
//! [`JobLifecycle::report_completion`]; once the counter reaches the
//! configured threshold on an active file, the job is cancelled and the file
//! deactivated. Reactivation is a manual action (force sync or config edit).

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::error::AppError;
use crate::job::ScheduledJob;
use crate::models::{FileStatus, TrackedFile};
use crate::scheduler::JobScheduler;
use crate::traits::FileStore;

/// How a run ended, as seen by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub succeeded: bool,
    /// False when the run succeeded without producing new content.
    pub object_updated: bool,
    pub status: FileStatus,
    pub failure_reason: Option<String>,
}

impl Completion {
    /// A fresh extract was stored.
    pub fn updated() -> Self {
        Self {
            succeeded: true,
            object_updated: true,
            status: FileStatus::Available,
            failure_reason: None,
        }
    }

    /// The export was empty; nothing was stored.
    pub fn no_content() -> Self {
        Self {
            succeeded: true,
            object_updated: false,
            status: FileStatus::Unavailable,
            failure_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            object_updated: false,
            status: FileStatus::SyncFailed,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Schedules, cancels and accounts for the recurring sync of each file.
#[derive(Clone)]
pub struct JobLifecycle<S, J>
where
    S: FileStore,
    J: JobScheduler,
{
    store: S,
    scheduler: J,
    config: LifecycleConfig,
}

impl<S, J> JobLifecycle<S, J>
where
    S: FileStore,
    J: JobScheduler,
{
    pub fn new(store: S, scheduler: J, config: LifecycleConfig) -> Self {
        Self {
            store,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &J {
        &self.scheduler
    }

    async fn load(&self, file_id: i64) -> Result<TrackedFile, AppError> {
        self.store
            .get_file(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))
    }

    /// Register the recurring job for `file_id`.
    ///
    /// Returns `Ok(None)` for inactive files. If the metadata already points
    /// at a live registration it is returned unchanged.
    pub async fn schedule(&self, file_id: i64) -> Result<Option<ScheduledJob>, AppError> {
        let mut file = self.load(file_id).await?;
        if !file.is_active {
            debug!(file_id, "File inactive, not scheduling");
            return Ok(None);
        }

        if file.metadata.is_scheduled() {
            if let Some(job) = self.scheduler.get_job(&file.metadata.job_id).await? {
                return Ok(Some(job));
            }
        }

        let job = self
            .scheduler
            .register_recurring(file_id, self.config.sync_interval)
            .await?;
        file.metadata.job_id = job.id.clone();
        file.metadata.sync_failures = 0;
        self.store.set_metadata(file_id, &file.metadata).await?;

        info!(file_id, job_id = %job.id, interval = ?self.config.sync_interval, "Scheduled recurring sync");
        Ok(Some(job))
    }

    /// Remove the recurring job and reset the failure counter.
    ///
    /// An in-flight run is not interrupted; it still reports completion.
    pub async fn cancel(&self, file_id: i64) -> Result<(), AppError> {
        let mut file = self.load(file_id).await?;
        self.cancel_job(&mut file).await?;
        self.store.set_metadata(file_id, &file.metadata).await
    }

    async fn cancel_job(&self, file: &mut TrackedFile) -> Result<(), AppError> {
        if file.metadata.is_scheduled() {
            let removed = self.scheduler.cancel(&file.metadata.job_id).await?;
            debug!(file_id = file.id, job_id = %file.metadata.job_id, removed, "Cancelled recurring sync");
        }
        file.metadata.clear_job();
        Ok(())
    }

    /// Record the outcome of a run and persist the final status.
    pub async fn report_completion(
        &self,
        file_id: i64,
        completion: Completion,
    ) -> Result<TrackedFile, AppError> {
        let mut file = self.load(file_id).await?;
        let now = Utc::now();

        if completion.succeeded {
            if completion.object_updated {
                file.last_updated = Some(now);
            }
            file.metadata.sync_failures = 0;
            file.metadata.failure_reason = None;
        } else {
            file.metadata.sync_failures = file.metadata.sync_failures.saturating_add(1);
            if completion.failure_reason.is_some() {
                file.metadata.failure_reason = completion.failure_reason;
            }

            if file.metadata.sync_failures >= self.config.failure_threshold && file.is_active {
                warn!(
                    file_id,
                    failures = file.metadata.sync_failures,
                    threshold = self.config.failure_threshold,
                    "Failure threshold reached, deactivating file"
                );
                self.cancel_job(&mut file).await?;
                file.is_active = false;
            }
        }

        file.status = completion.status;
        file.last_synced = Some(now);
        self.store.save_sync_state(&file).await?;
        Ok(file)
    }

    /// Schedule every active file that has no live registration.
    ///
    /// Returns how many files were newly scheduled.
    pub async fn schedule_all_active(&self) -> Result<usize, AppError> {
        let mut scheduled = 0;
        for file in self.store.list_active().await? {
            if file.metadata.is_scheduled()
                && self.scheduler.get_job(&file.metadata.job_id).await?.is_some()
            {
                continue;
            }
            match self.schedule(file.id).await {
                Ok(Some(_)) => scheduled += 1,
                Ok(None) => {}
                Err(e) => warn!(file_id = file.id, error = %e, "Failed to schedule file"),
            }
        }
        info!(scheduled, "Scheduled active files");
        Ok(scheduled)
    }
}
