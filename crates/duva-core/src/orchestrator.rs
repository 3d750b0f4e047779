//! Sync orchestrator: one export-to-extract run per tracked file.
//!
//! # State machine
//!
//! ```text
//! Unavailable → Queued → Syncing → Available
//!                          ↑  ↘
//!                          │   Unavailable   (empty export)
//!                          └── SyncFailed
//! ```
//!
//! A run:
//!
//! 1. takes the per-file lock (contention → [`SyncOutcome::Skipped`]);
//! 2. persists `Syncing`;
//! 3. polls the upstream export into a scratch directory;
//! 4. normalizes the CSV; an empty export ends the run as `Unavailable`;
//! 5. builds the extract and uploads it under the file's storage key;
//! 6. publishes to the BI target if one is configured (best effort);
//! 7. reports to the [`JobLifecycle`], which persists the final status.
//!
//! Pipeline errors from steps 3-5 never escape [`SyncService::run_sync`];
//! they become `SyncFailed` plus a failure reason. A failed build leaves the
//! previously stored extract untouched because nothing is uploaded.
//!
//! # Collaborators
//!
//! [`SyncService`] is generic over a [`SyncStack`], which names the concrete
//! implementation of every collaborator trait. Production wiring lives in
//! `duva-server`; the integration tests use in-memory mocks.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::AppError;
use crate::extract::{EngineHandle, ExtractEngine};
use crate::lifecycle::{Completion, JobLifecycle};
use crate::lock::{LockGuard, SyncLock, sync_lock_key};
use crate::metrics::FailureSink;
use crate::models::{
    ExportOptions, FileStatus, NewTrackedFile, PublishTarget, TrackedFile, UserAccount,
};
use crate::normalize::normalize;
use crate::poller::ExportPoller;
use crate::scheduler::JobScheduler;
use crate::sync::{SyncOutcome, SyncRequest};
use crate::traits::{
    AccountStore, CredentialBroker, FileStore, ObjectStorage, PublishClient, PublishTargetStore,
    UpstreamApi,
};

// =============================================================================
// Collaborator bundle
// =============================================================================

/// The concrete collaborator types a [`SyncService`] runs against.
pub trait SyncStack: Send + Sync + 'static {
    type Files: FileStore + 'static;
    type Targets: PublishTargetStore + 'static;
    type Accounts: AccountStore + 'static;
    type Upstream: UpstreamApi + 'static;
    type Broker: CredentialBroker + 'static;
    type Storage: ObjectStorage + 'static;
    type Publisher: PublishClient + 'static;
    type Engine: ExtractEngine;
    type Lock: SyncLock + 'static;
    type Scheduler: JobScheduler + 'static;
}

/// Everything needed to build a [`SyncService`].
pub struct SyncParts<K: SyncStack> {
    pub files: K::Files,
    pub targets: K::Targets,
    pub accounts: K::Accounts,
    pub poller: ExportPoller<K::Upstream, K::Broker>,
    pub storage: K::Storage,
    pub publisher: K::Publisher,
    pub engine: EngineHandle<K::Engine>,
    pub lock: K::Lock,
    pub lifecycle: JobLifecycle<K::Files, K::Scheduler>,
    pub sink: Arc<dyn FailureSink>,
}

/// Changes accepted by [`SyncService::update_file`].
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    /// `Some(None)` detaches the publish target.
    pub publish_target_id: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

/// Presigned download URL for a stored extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadLink {
    pub url: String,
    pub valid_till: DateTime<Utc>,
}

/// What a run produced before reporting.
enum Produced {
    Empty,
    Stored { rows: u64 },
}

// =============================================================================
// Sync Service
// =============================================================================

/// Drives sync runs and the user-facing file operations around them.
pub struct SyncService<K: SyncStack> {
    files: K::Files,
    targets: K::Targets,
    accounts: K::Accounts,
    poller: ExportPoller<K::Upstream, K::Broker>,
    storage: K::Storage,
    publisher: K::Publisher,
    engine: EngineHandle<K::Engine>,
    lock: K::Lock,
    lifecycle: JobLifecycle<K::Files, K::Scheduler>,
    sink: Arc<dyn FailureSink>,
    config: SyncConfig,
}

impl<K: SyncStack> Clone for SyncService<K> {
    fn clone(&self) -> Self {
        Self {
            files: self.files.clone(),
            targets: self.targets.clone(),
            accounts: self.accounts.clone(),
            poller: self.poller.clone(),
            storage: self.storage.clone(),
            publisher: self.publisher.clone(),
            engine: self.engine.clone(),
            lock: self.lock.clone(),
            lifecycle: self.lifecycle.clone(),
            sink: Arc::clone(&self.sink),
            config: self.config.clone(),
        }
    }
}

impl<K: SyncStack> SyncService<K> {
    pub fn new(parts: SyncParts<K>, config: SyncConfig) -> Self {
        Self {
            files: parts.files,
            targets: parts.targets,
            accounts: parts.accounts,
            poller: parts.poller,
            storage: parts.storage,
            publisher: parts.publisher,
            engine: parts.engine,
            lock: parts.lock,
            lifecycle: parts.lifecycle,
            sink: parts.sink,
            config,
        }
    }

    pub fn files(&self) -> &K::Files {
        &self.files
    }

    pub fn targets(&self) -> &K::Targets {
        &self.targets
    }

    pub fn publisher(&self) -> &K::Publisher {
        &self.publisher
    }

    pub fn lifecycle(&self) -> &JobLifecycle<K::Files, K::Scheduler> {
        &self.lifecycle
    }

    pub fn engine(&self) -> &EngineHandle<K::Engine> {
        &self.engine
    }

    async fn load_file(&self, file_id: i64) -> Result<TrackedFile, AppError> {
        self.files
            .get_file(file_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {}", file_id)))
    }

    async fn load_account(&self, user_id: i64) -> Result<UserAccount, AppError> {
        self.accounts
            .get_account(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", user_id)))
    }

    /// Load a publish target, checking it belongs to `user_id`.
    async fn load_target(&self, user_id: i64, target_id: i64) -> Result<PublishTarget, AppError> {
        match self.targets.get_target(target_id).await? {
            Some(target) if target.user_id == user_id => Ok(target),
            _ => Err(AppError::NotFound(format!("Configuration {}", target_id))),
        }
    }

    // -------------------------------------------------------------------------
    // Sync runs
    // -------------------------------------------------------------------------

    /// Run one sync for `file_id` under the per-file lock.
    ///
    /// Returns `Err` only for bookkeeping failures (missing file, database
    /// errors). Export, normalization, build and upload errors are recorded
    /// on the file and returned as [`SyncOutcome::Failed`].
    pub async fn run_sync(&self, file_id: i64) -> Result<SyncOutcome, AppError> {
        let key = sync_lock_key(file_id);
        let Some(guard) = self.lock.acquire(&key, self.config.lock_timeout).await? else {
            debug!(file_id, "Sync already in flight, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        let result = self.run_locked(file_id).await;

        if let Err(e) = guard.release().await {
            warn!(file_id, error = %e, "Failed to release sync lock");
        }
        result
    }

    async fn run_locked(&self, file_id: i64) -> Result<SyncOutcome, AppError> {
        let file = self.load_file(file_id).await?;
        let account = self.load_account(file.user_id).await?;
        let target = match file.publish_target_id {
            Some(id) => self.targets.get_target(id).await?,
            None => None,
        };

        self.files.set_status(file_id, FileStatus::Syncing).await?;
        info!(file_id, form_id = file.form_id, "Sync started");

        let produced = match self.scratch_dir() {
            Ok(dir) => {
                self.produce(&file, &account, target.as_ref(), dir.path())
                    .await
            }
            Err(e) => Err(e),
        };

        let (outcome, completion) = match produced {
            Ok(Produced::Stored { rows }) => {
                self.sink.record_success(file_id);
                (SyncOutcome::Available { rows }, Completion::updated())
            }
            Ok(Produced::Empty) => {
                self.sink.record_success(file_id);
                (SyncOutcome::Unavailable, Completion::no_content())
            }
            Err(e) => {
                self.sink.record_failure(file_id, &e);
                let reason = e.failure_reason();
                (
                    SyncOutcome::Failed {
                        reason: reason.clone(),
                    },
                    Completion::failed(reason),
                )
            }
        };

        self.lifecycle.report_completion(file_id, completion).await?;
        info!(file_id, %outcome, "Sync finished");
        Ok(outcome)
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, AppError> {
        std::fs::create_dir_all(&self.config.media_root)?;
        Ok(tempfile::Builder::new()
            .prefix("sync-")
            .tempdir_in(&self.config.media_root)?)
    }

    /// Export, normalize, build, upload and publish.
    async fn produce(
        &self,
        file: &TrackedFile,
        account: &UserAccount,
        target: Option<&PublishTarget>,
        dir: &Path,
    ) -> Result<Produced, AppError> {
        let options = target
            .map(|t| t.export_settings.clone())
            .unwrap_or_else(ExportOptions::default);

        let csv = self
            .poller
            .request_export(account, file.form_id, &options, dir)
            .await?
            .into_path()?;

        let normalized = {
            let csv = csv.clone();
            tokio::task::spawn_blocking(move || normalize(&csv))
                .await
                .map_err(|e| AppError::NormalizeError(format!("normalize task failed: {}", e)))??
        };
        let normalized = match normalized {
            Some(n) if !n.is_empty() => n,
            _ => {
                info!(file_id = file.id, "Export is empty");
                return Ok(Produced::Empty);
            }
        };

        let output = dir.join(&file.filename);
        let rows = self
            .engine
            .build_extract(&normalized.columns, &csv, &output)
            .await?;

        let key = file.storage_key(account);
        self.storage.put_file(&output, &key).await?;
        debug!(file_id = file.id, %key, rows, "Extract stored");

        if let Some(target) = target {
            if let Err(e) = self.publish(target, &output, file).await {
                warn!(file_id = file.id, error = %e, "Publish failed, extract is stored");
                self.sink.capture(file.id, "publish", &e);
            }
        }

        Ok(Produced::Stored { rows })
    }

    async fn publish(
        &self,
        target: &PublishTarget,
        extract: &Path,
        file: &TrackedFile,
    ) -> Result<(), AppError> {
        self.publisher.validate(target).await?;
        let name = datasource_name(&file.filename);
        self.publisher.publish(target, extract, name).await?;
        info!(file_id = file.id, project = %target.project_name, datasource = name, "Extract published");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // File operations
    // -------------------------------------------------------------------------

    /// Track `form_id` for `user_id`.
    ///
    /// Returns the existing file when the pair is already tracked. Encrypted
    /// forms are rejected with [`AppError::UnsupportedSource`] and nothing is
    /// created. New files start `Queued` with a recurring job; `sync_now`
    /// additionally queues an immediate run.
    pub async fn register_file(
        &self,
        user_id: i64,
        form_id: i64,
        publish_target_id: Option<i64>,
        sync_now: bool,
    ) -> Result<TrackedFile, AppError> {
        if let Some(existing) = self.files.find_by_form(user_id, form_id).await? {
            return Ok(existing);
        }

        let account = self.load_account(user_id).await?;
        if let Some(target_id) = publish_target_id {
            self.load_target(user_id, target_id).await?;
        }

        let form = self.poller.fetch_form(&account, form_id).await?;
        if form.is_encrypted() {
            return Err(AppError::UnsupportedSource(format!(
                "form {} is encrypted",
                form_id
            )));
        }

        let filename = extract_filename(&form.title, <K::Engine as ExtractEngine>::FILE_EXTENSION);
        let file = self
            .files
            .create_file(&NewTrackedFile {
                user_id,
                form_id,
                filename,
                status: FileStatus::Queued,
                publish_target_id,
            })
            .await?;
        info!(file_id = file.id, user_id, form_id, "Tracking form");

        self.lifecycle.schedule(file.id).await?;
        if sync_now {
            self.lifecycle.scheduler().enqueue_once(file.id).await?;
        }
        self.load_file(file.id).await
    }

    /// Queue an immediate run, refusing while one is queued or running.
    ///
    /// A configured publish target is validated first. An inactive file is
    /// reactivated and rescheduled.
    pub async fn request_sync(&self, file_id: i64) -> Result<SyncRequest, AppError> {
        let file = self.load_file(file_id).await?;

        if let Some(target_id) = file.publish_target_id {
            let target = self.load_target(file.user_id, target_id).await?;
            self.publisher.validate(&target).await?;
        }

        if file.status.is_in_progress() {
            debug!(file_id, status = %file.status, "Sync already in progress");
            return Ok(SyncRequest::AlreadyInProgress);
        }

        // Column-level writes: a run finishing meanwhile keeps its metadata.
        self.files.set_status(file_id, FileStatus::Queued).await?;
        if !file.is_active {
            info!(file_id, "Reactivating file");
            self.files.set_active(file_id, true).await?;
            self.lifecycle.schedule(file_id).await?;
        }

        self.lifecycle.scheduler().enqueue_once(file_id).await?;
        Ok(SyncRequest::Enqueued)
    }

    /// Apply a configuration edit. Activation changes (re)schedule or cancel
    /// the recurring job.
    pub async fn update_file(
        &self,
        file_id: i64,
        update: FileUpdate,
    ) -> Result<TrackedFile, AppError> {
        let file = self.load_file(file_id).await?;

        if let Some(target_id) = update.publish_target_id {
            if let Some(id) = target_id {
                self.load_target(file.user_id, id).await?;
            }
            self.files.set_publish_target(file_id, target_id).await?;
        }

        match update.is_active.filter(|&active| active != file.is_active) {
            Some(true) => {
                self.files.set_active(file_id, true).await?;
                self.lifecycle.schedule(file_id).await?;
            }
            Some(false) => {
                self.files.set_active(file_id, false).await?;
                self.lifecycle.cancel(file_id).await?;
            }
            None => {}
        }
        self.load_file(file_id).await
    }

    /// Cancel the job, delete the stored extract and the row.
    ///
    /// Returns false if the file did not exist.
    pub async fn delete_file(&self, file_id: i64) -> Result<bool, AppError> {
        let Some(file) = self.files.get_file(file_id).await? else {
            return Ok(false);
        };

        self.lifecycle.cancel(file_id).await?;
        if let Some(account) = self.accounts.get_account(file.user_id).await? {
            self.storage.delete(&file.storage_key(&account)).await?;
        }
        let deleted = self.files.delete_file(file_id).await?;
        info!(file_id, "File deleted");
        Ok(deleted)
    }

    /// Presigned URL for the stored extract, `None` until one is uploaded.
    pub async fn download_link(&self, file: &TrackedFile) -> Result<Option<DownloadLink>, AppError> {
        let account = self.load_account(file.user_id).await?;
        let key = file.storage_key(&account);
        if !self.storage.exists(&key).await? {
            return Ok(None);
        }

        let expiry = self.config.presign_expiry;
        let url = self.storage.presign(&key, expiry).await?;
        let valid_till = Utc::now()
            + chrono::Duration::from_std(expiry).unwrap_or_else(|_| chrono::Duration::zero());
        Ok(Some(DownloadLink { url, valid_till }))
    }
}

/// Extract filename for a form title. Path separators are replaced so the
/// name stays a single storage key segment.
pub fn extract_filename(title: &str, extension: &str) -> String {
    let title = title.trim().replace(['/', '\\'], "_");
    format!("{}.{}", title, extension)
}

/// Datasource name: the filename without its extension.
fn datasource_name(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}
