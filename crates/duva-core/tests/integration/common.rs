//! Test utilities and mock implementations for integration tests.
//!
//! Every collaborator trait has an in-memory mock backed by
//! `Arc<Mutex<..>>`, so clones share state and tests can inspect what the
//! services did. [`TestEnv`] wires them into a [`SyncService`].

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use duva_core::crypto::EncryptedSecret;
use duva_core::{
    AppError, EngineHandle, ExportJobStatus, ExportOptions, ExportPoller, ExtractEngine,
    FileStatus, FileStore, FormInfo, JobLifecycle, JobMetadata, JobScheduler, LifecycleConfig,
    LocalSyncLock, NewPublishTarget, NewTrackedFile, ObjectStorage, ParquetEngine, PollerConfig,
    PublishClient, PublishTarget, PublishTargetStore, ScheduledJob, SecretString, SyncConfig,
    SyncParts, SyncService, SyncStack, TrackedFile, TracingFailureSink, UpstreamApi,
    UpstreamCredential, UpstreamResponse, UserAccount,
};
use duva_core::extract::{CopyOptions, TableDefinition};
use duva_core::traits::{AccountStore, CredentialBroker};

pub const SERVER_URL: &str = "https://ona.example.com";
pub const EXPORT_URL: &str = "https://ona.example.com/api/v1/forms/7/export.csv?job=1";
pub const TEMP_TOKEN: &str = "tmp-123";
pub const USER_ID: i64 = 1;
pub const FORM_ID: i64 = 7;

pub fn account() -> UserAccount {
    UserAccount {
        id: USER_ID,
        server_id: 3,
        server_url: SERVER_URL.to_string(),
        username: "bob".to_string(),
    }
}

pub fn public_form() -> FormInfo {
    FormInfo {
        form_id: FORM_ID,
        title: "Household Survey".to_string(),
        public_key: None,
        public: true,
    }
}

// =============================================================================
// MockFileStore
// =============================================================================

type RowEdit = Box<dyn FnOnce(&mut TrackedFile) + Send>;

/// Tracked files plus a log of every status write.
#[derive(Clone, Default)]
pub struct MockFileStore {
    files: Arc<Mutex<HashMap<i64, TrackedFile>>>,
    status_log: Arc<Mutex<Vec<(i64, FileStatus)>>>,
    next_id: Arc<AtomicI64>,
    after_next_read: Arc<Mutex<Option<RowEdit>>>,
}

impl MockFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an active file for [`FORM_ID`] owned by [`USER_ID`].
    pub fn seed(&self, status: FileStatus) -> TrackedFile {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let file = TrackedFile {
            id,
            user_id: USER_ID,
            form_id: FORM_ID + id - 1,
            filename: "Household Survey.parquet".to_string(),
            status,
            metadata: JobMetadata::default(),
            is_active: true,
            last_updated: None,
            last_synced: None,
            publish_target_id: None,
        };
        self.files.lock().unwrap().insert(id, file.clone());
        file
    }

    fn edit(&self, id: i64, f: impl FnOnce(&mut TrackedFile)) -> Result<(), AppError> {
        let mut files = self.files.lock().unwrap();
        let file = files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", id)))?;
        f(file);
        Ok(())
    }

    pub fn get(&self, id: i64) -> Option<TrackedFile> {
        self.files.lock().unwrap().get(&id).cloned()
    }

    pub fn update(&self, id: i64, f: impl FnOnce(&mut TrackedFile)) {
        let mut files = self.files.lock().unwrap();
        if let Some(file) = files.get_mut(&id) {
            f(file);
        }
    }

    /// Apply `f` to the stored row right after the next `get_file` returns
    /// its snapshot, as a concurrent writer would.
    pub fn edit_after_next_read(&self, f: impl FnOnce(&mut TrackedFile) + Send + 'static) {
        *self.after_next_read.lock().unwrap() = Some(Box::new(f));
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    /// Every status written through `set_status` or `save_sync_state`, in order.
    pub fn status_history(&self, id: i64) -> Vec<FileStatus> {
        self.status_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(file_id, _)| *file_id == id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl FileStore for MockFileStore {
    async fn get_file(&self, id: i64) -> Result<Option<TrackedFile>, AppError> {
        let snapshot = self.get(id);
        if let Some(edit) = self.after_next_read.lock().unwrap().take() {
            self.update(id, edit);
        }
        Ok(snapshot)
    }

    async fn list_files(
        &self,
        user_id: i64,
        form_id: Option<i64>,
    ) -> Result<Vec<TrackedFile>, AppError> {
        let mut files: Vec<_> = self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.user_id == user_id && form_id.is_none_or(|id| f.form_id == id))
            .cloned()
            .collect();
        files.sort_by_key(|f| f.id);
        Ok(files)
    }

    async fn list_active(&self) -> Result<Vec<TrackedFile>, AppError> {
        let mut files: Vec<_> = self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.is_active)
            .cloned()
            .collect();
        files.sort_by_key(|f| f.id);
        Ok(files)
    }

    async fn find_by_form(
        &self,
        user_id: i64,
        form_id: i64,
    ) -> Result<Option<TrackedFile>, AppError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .values()
            .find(|f| f.user_id == user_id && f.form_id == form_id)
            .cloned())
    }

    async fn create_file(&self, new: &NewTrackedFile) -> Result<TrackedFile, AppError> {
        let mut files = self.files.lock().unwrap();
        if files
            .values()
            .any(|f| f.user_id == new.user_id && f.form_id == new.form_id)
        {
            return Err(AppError::Conflict(format!("form {} already tracked", new.form_id)));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let file = TrackedFile {
            id,
            user_id: new.user_id,
            form_id: new.form_id,
            filename: new.filename.clone(),
            status: new.status,
            metadata: JobMetadata::default(),
            is_active: true,
            last_updated: None,
            last_synced: None,
            publish_target_id: new.publish_target_id,
        };
        files.insert(id, file.clone());
        Ok(file)
    }

    async fn set_status(&self, id: i64, status: FileStatus) -> Result<(), AppError> {
        let mut files = self.files.lock().unwrap();
        let file = files
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", id)))?;
        file.status = status;
        self.status_log.lock().unwrap().push((id, status));
        Ok(())
    }

    async fn save_sync_state(&self, file: &TrackedFile) -> Result<(), AppError> {
        let mut files = self.files.lock().unwrap();
        let stored = files
            .get_mut(&file.id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", file.id)))?;
        stored.status = file.status;
        stored.metadata = file.metadata.clone();
        stored.is_active = file.is_active;
        stored.last_updated = file.last_updated;
        stored.last_synced = file.last_synced;
        self.status_log.lock().unwrap().push((file.id, file.status));
        Ok(())
    }

    async fn set_metadata(&self, id: i64, metadata: &JobMetadata) -> Result<(), AppError> {
        self.edit(id, |file| file.metadata = metadata.clone())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), AppError> {
        self.edit(id, |file| file.is_active = active)
    }

    async fn set_publish_target(&self, id: i64, target_id: Option<i64>) -> Result<(), AppError> {
        self.edit(id, |file| file.publish_target_id = target_id)
    }

    async fn delete_file(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.files.lock().unwrap().remove(&id).is_some())
    }
}

// =============================================================================
// MockTargetStore / MockAccountStore
// =============================================================================

#[derive(Clone, Default)]
pub struct MockTargetStore {
    targets: Arc<Mutex<HashMap<i64, PublishTarget>>>,
    next_id: Arc<AtomicI64>,
}

impl MockTargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, user_id: i64) -> PublishTarget {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let target = PublishTarget {
            id,
            user_id,
            server_address: "https://tableau.example.com".to_string(),
            site_name: "field".to_string(),
            token_name: "duva".to_string(),
            token_value: EncryptedSecret::from_stored("sealed"),
            project_name: "Surveys".to_string(),
            export_settings: ExportOptions::default(),
        };
        self.targets.lock().unwrap().insert(id, target.clone());
        target
    }
}

impl PublishTargetStore for MockTargetStore {
    async fn get_target(&self, id: i64) -> Result<Option<PublishTarget>, AppError> {
        Ok(self.targets.lock().unwrap().get(&id).cloned())
    }

    async fn list_targets(&self, user_id: i64) -> Result<Vec<PublishTarget>, AppError> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_target(&self, new: &NewPublishTarget) -> Result<PublishTarget, AppError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let target = PublishTarget {
            id,
            user_id: new.user_id,
            server_address: new.server_address.clone(),
            site_name: new.site_name.clone(),
            token_name: new.token_name.clone(),
            token_value: new.token_value.clone(),
            project_name: new.project_name.clone(),
            export_settings: new.export_settings.clone(),
        };
        self.targets.lock().unwrap().insert(id, target.clone());
        Ok(target)
    }

    async fn update_target(&self, target: &PublishTarget) -> Result<(), AppError> {
        self.targets
            .lock()
            .unwrap()
            .insert(target.id, target.clone());
        Ok(())
    }

    async fn delete_target(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.targets.lock().unwrap().remove(&id).is_some())
    }
}

#[derive(Clone)]
pub struct MockAccountStore {
    accounts: Arc<Mutex<HashMap<i64, UserAccount>>>,
}

impl MockAccountStore {
    pub fn new() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(USER_ID, account());
        Self {
            accounts: Arc::new(Mutex::new(accounts)),
        }
    }
}

impl AccountStore for MockAccountStore {
    async fn get_account(&self, user_id: i64) -> Result<Option<UserAccount>, AppError> {
        Ok(self.accounts.lock().unwrap().get(&user_id).cloned())
    }

    async fn get_credential(&self, user_id: i64) -> Result<Option<UpstreamCredential>, AppError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|a| UpstreamCredential {
                user_id,
                server_url: a.server_url.clone(),
                client_id: "client".to_string(),
                client_secret: EncryptedSecret::from_stored("sealed"),
                refresh_token: EncryptedSecret::from_stored("sealed"),
                access_token: None,
            }))
    }

    async fn rotate_tokens(
        &self,
        _user_id: i64,
        _previous_refresh: &EncryptedSecret,
        _access_token: &EncryptedSecret,
        _refresh_token: &EncryptedSecret,
    ) -> Result<bool, AppError> {
        Ok(true)
    }
}

// =============================================================================
// MockBroker
// =============================================================================

/// Hands out `token-<n>` where n counts refreshes.
#[derive(Clone, Default)]
pub struct MockBroker {
    refreshes: Arc<AtomicUsize>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl CredentialBroker for MockBroker {
    async fn access_token(&self, _user_id: i64) -> Result<SecretString, AppError> {
        Ok(SecretString::new(format!("token-{}", self.refreshes())))
    }

    async fn refresh_access_token(&self, _user_id: i64) -> Result<SecretString, AppError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SecretString::new(format!("token-{}", n)))
    }
}

// =============================================================================
// MockUpstream
// =============================================================================

/// Scripted upstream API.
///
/// Export polls pop from a script and fall back to `Success` with
/// [`EXPORT_URL`] once it is exhausted. Downloads do the same and write
/// the configured CSV body to the destination.
#[derive(Clone)]
pub struct MockUpstream {
    form: Arc<Mutex<UpstreamResponse<FormInfo>>>,
    exports: Arc<Mutex<VecDeque<UpstreamResponse<ExportJobStatus>>>>,
    downloads: Arc<Mutex<VecDeque<UpstreamResponse<u64>>>>,
    csv: Arc<Mutex<String>>,
    temp_token: Arc<Mutex<String>>,
    export_calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
    download_urls: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self {
            form: Arc::new(Mutex::new(UpstreamResponse::Ok(public_form()))),
            exports: Arc::new(Mutex::new(VecDeque::new())),
            downloads: Arc::new(Mutex::new(VecDeque::new())),
            csv: Arc::new(Mutex::new("name,age\nAlice,30\nBob,\nCarol,41\n".to_string())),
            temp_token: Arc::new(Mutex::new(TEMP_TOKEN.to_string())),
            export_calls: Arc::new(Mutex::new(Vec::new())),
            download_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_form(self, form: FormInfo) -> Self {
        *self.form.lock().unwrap() = UpstreamResponse::Ok(form);
        self
    }

    pub fn set_form_response(&self, response: UpstreamResponse<FormInfo>) {
        *self.form.lock().unwrap() = response;
    }

    pub fn with_csv(self, body: &str) -> Self {
        self.set_csv(body);
        self
    }

    pub fn set_csv(&self, body: &str) {
        *self.csv.lock().unwrap() = body.to_string();
    }

    pub fn set_temp_token(&self, token: &str) {
        *self.temp_token.lock().unwrap() = token.to_string();
    }

    pub fn push_export(&self, response: UpstreamResponse<ExportJobStatus>) {
        self.exports.lock().unwrap().push_back(response);
    }

    pub fn push_pending(&self, job_uuid: Option<&str>) {
        self.push_export(UpstreamResponse::Ok(ExportJobStatus::Pending {
            job_uuid: job_uuid.map(str::to_string),
        }));
    }

    pub fn push_failure(&self, reason: &str) {
        self.push_export(UpstreamResponse::Ok(ExportJobStatus::Failure {
            reason: reason.to_string(),
        }));
    }

    pub fn push_download(&self, response: UpstreamResponse<u64>) {
        self.downloads.lock().unwrap().push_back(response);
    }

    /// `(token, job_uuid)` of every export poll.
    pub fn export_calls(&self) -> Vec<(String, Option<String>)> {
        self.export_calls.lock().unwrap().clone()
    }

    pub fn download_urls(&self) -> Vec<String> {
        self.download_urls.lock().unwrap().clone()
    }
}

impl UpstreamApi for MockUpstream {
    async fn get_form(
        &self,
        _server_url: &str,
        _token: SecretString,
        _form_id: i64,
    ) -> Result<UpstreamResponse<FormInfo>, AppError> {
        Ok(self.form.lock().unwrap().clone())
    }

    async fn export_status(
        &self,
        _server_url: &str,
        token: SecretString,
        _form_id: i64,
        _options: &ExportOptions,
        job_uuid: Option<&str>,
    ) -> Result<UpstreamResponse<ExportJobStatus>, AppError> {
        self.export_calls
            .lock()
            .unwrap()
            .push((token.expose().to_string(), job_uuid.map(str::to_string)));
        let next = self.exports.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| {
            UpstreamResponse::Ok(ExportJobStatus::Success {
                export_url: EXPORT_URL.to_string(),
            })
        }))
    }

    async fn temp_token(
        &self,
        _server_url: &str,
        _token: SecretString,
    ) -> Result<UpstreamResponse<String>, AppError> {
        Ok(UpstreamResponse::Ok(self.temp_token.lock().unwrap().clone()))
    }

    async fn download(
        &self,
        url: &str,
        _token: SecretString,
        dest: &Path,
    ) -> Result<UpstreamResponse<u64>, AppError> {
        self.download_urls.lock().unwrap().push(url.to_string());
        let next = self.downloads.lock().unwrap().pop_front();
        match next {
            Some(UpstreamResponse::Ok(_)) | None => {
                let body = self.csv.lock().unwrap().clone();
                std::fs::write(dest, &body)?;
                Ok(UpstreamResponse::Ok(body.len() as u64))
            }
            Some(other) => Ok(other),
        }
    }
}

// =============================================================================
// MockStorage / MockPublisher
// =============================================================================

#[derive(Clone, Default)]
pub struct MockStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ObjectStorage for MockStorage {
    async fn put_file(&self, local: &Path, key: &str) -> Result<(), AppError> {
        let bytes = std::fs::read(local)?;
        self.insert(key, &bytes);
        Ok(())
    }

    async fn get_to_path(&self, key: &str, dest: &Path) -> Result<(), AppError> {
        let bytes = self
            .get(key)
            .ok_or_else(|| AppError::NotFound(format!("Object {}", key)))?;
        std::fs::write(dest, bytes)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn presign(&self, key: &str, expires_in: Duration) -> Result<String, AppError> {
        Ok(format!(
            "https://storage.example.com/{}?expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}

#[derive(Clone, Default)]
pub struct MockPublisher {
    invalid: Arc<Mutex<Option<String>>>,
    published: Arc<Mutex<Vec<(i64, String)>>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `validate` fail with `reason`.
    pub fn reject(&self, reason: &str) {
        *self.invalid.lock().unwrap() = Some(reason.to_string());
    }

    /// `(target_id, datasource_name)` of every publish.
    pub fn published(&self) -> Vec<(i64, String)> {
        self.published.lock().unwrap().clone()
    }
}

impl PublishClient for MockPublisher {
    async fn validate(&self, _target: &PublishTarget) -> Result<(), AppError> {
        match self.invalid.lock().unwrap().clone() {
            Some(reason) => Err(AppError::PublishValidation(reason)),
            None => Ok(()),
        }
    }

    async fn publish(
        &self,
        target: &PublishTarget,
        extract: &Path,
        datasource_name: &str,
    ) -> Result<(), AppError> {
        assert!(extract.exists(), "extract must exist when publishing");
        self.published
            .lock()
            .unwrap()
            .push((target.id, datasource_name.to_string()));
        Ok(())
    }
}

// =============================================================================
// MockScheduler
// =============================================================================

#[derive(Clone, Default)]
pub struct MockScheduler {
    jobs: Arc<Mutex<HashMap<String, ScheduledJob>>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs_for(&self, file_id: i64) -> Vec<ScheduledJob> {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.file_id == file_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Make every registration for `file_id` due now.
    pub fn make_due(&self, file_id: i64) {
        for job in self.jobs.lock().unwrap().values_mut() {
            if job.file_id == file_id {
                job.next_run_at = Utc::now() - chrono::Duration::seconds(1);
            }
        }
    }

    pub fn insert(&self, job: ScheduledJob) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    fn register(&self, job: ScheduledJob) -> ScheduledJob {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(existing) = jobs
            .values()
            .find(|j| j.job_name == job.job_name && j.file_id == job.file_id)
        {
            return existing.clone();
        }
        jobs.insert(job.id.clone(), job.clone());
        job
    }
}

impl JobScheduler for MockScheduler {
    async fn register_recurring(
        &self,
        file_id: i64,
        interval: Duration,
    ) -> Result<ScheduledJob, AppError> {
        Ok(self.register(ScheduledJob::recurring(file_id, interval)))
    }

    async fn enqueue_once(&self, file_id: i64) -> Result<ScheduledJob, AppError> {
        Ok(self.register(ScheduledJob::once(file_id)))
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, AppError> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, AppError> {
        Ok(self.jobs.lock().unwrap().remove(job_id).is_some())
    }

    async fn claim_due(&self, limit: u32) -> Result<Vec<ScheduledJob>, AppError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let mut due: Vec<ScheduledJob> = jobs.values().filter(|j| j.is_due(now)).cloned().collect();
        due.sort_by_key(|j| j.next_run_at);
        due.truncate(limit as usize);

        for job in &due {
            match job.interval {
                Some(interval) => {
                    let delta = chrono::Duration::from_std(interval).unwrap();
                    if let Some(stored) = jobs.get_mut(&job.id) {
                        stored.next_run_at = now + delta;
                    }
                }
                None => {
                    jobs.remove(&job.id);
                }
            }
        }
        Ok(due)
    }
}

// =============================================================================
// Engines
// =============================================================================

/// Engine whose bulk load always fails.
pub struct FailingEngine;

impl ExtractEngine for FailingEngine {
    const FILE_EXTENSION: &'static str = "parquet";

    fn start() -> Result<Self, AppError> {
        Ok(FailingEngine)
    }

    fn load_csv(
        &self,
        _output: &Path,
        _table: &TableDefinition,
        _csv: &Path,
        _options: &CopyOptions,
    ) -> Result<u64, AppError> {
        Err(AppError::ExtractBuild("bulk load rejected row 2".to_string()))
    }
}

// =============================================================================
// Test environment
// =============================================================================

/// Mock stack parameterized by extract engine.
pub struct MockStack<E>(PhantomData<E>);

impl<E: ExtractEngine> SyncStack for MockStack<E> {
    type Files = MockFileStore;
    type Targets = MockTargetStore;
    type Accounts = MockAccountStore;
    type Upstream = MockUpstream;
    type Broker = MockBroker;
    type Storage = MockStorage;
    type Publisher = MockPublisher;
    type Engine = E;
    type Lock = LocalSyncLock;
    type Scheduler = MockScheduler;
}

/// All mocks plus a scratch media root.
pub struct TestEnv {
    pub files: MockFileStore,
    pub targets: MockTargetStore,
    pub accounts: MockAccountStore,
    pub upstream: MockUpstream,
    pub broker: MockBroker,
    pub storage: MockStorage,
    pub publisher: MockPublisher,
    pub lock: LocalSyncLock,
    pub scheduler: MockScheduler,
    pub sink: Arc<TracingFailureSink>,
    pub media: tempfile::TempDir,
    pub poller_config: PollerConfig,
    pub lifecycle_config: LifecycleConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            files: MockFileStore::new(),
            targets: MockTargetStore::new(),
            accounts: MockAccountStore::new(),
            upstream: MockUpstream::new(),
            broker: MockBroker::new(),
            storage: MockStorage::new(),
            publisher: MockPublisher::new(),
            lock: LocalSyncLock::new(),
            scheduler: MockScheduler::new(),
            sink: Arc::new(TracingFailureSink::new()),
            media: tempfile::tempdir().unwrap(),
            poller_config: PollerConfig::default().with_base_delay(Duration::from_millis(1)),
            lifecycle_config: LifecycleConfig::default(),
        }
    }

    pub fn poller(&self) -> ExportPoller<MockUpstream, MockBroker> {
        ExportPoller::new(
            self.upstream.clone(),
            self.broker.clone(),
            self.poller_config.clone(),
        )
    }

    pub fn lifecycle(&self) -> JobLifecycle<MockFileStore, MockScheduler> {
        JobLifecycle::new(
            self.files.clone(),
            self.scheduler.clone(),
            self.lifecycle_config.clone(),
        )
    }

    pub fn service_with<E: ExtractEngine>(&self) -> SyncService<MockStack<E>> {
        let parts = SyncParts {
            files: self.files.clone(),
            targets: self.targets.clone(),
            accounts: self.accounts.clone(),
            poller: self.poller(),
            storage: self.storage.clone(),
            publisher: self.publisher.clone(),
            engine: EngineHandle::<E>::new(),
            lock: self.lock.clone(),
            lifecycle: self.lifecycle(),
            sink: self.sink.clone(),
        };
        let config = SyncConfig::default()
            .with_media_root(self.media.path())
            .with_lock_timeout(Duration::ZERO);
        SyncService::new(parts, config)
    }

    pub fn service(&self) -> SyncService<MockStack<ParquetEngine>> {
        self.service_with::<ParquetEngine>()
    }

    /// Storage key of `file` for the seeded account.
    pub fn key(&self, file: &TrackedFile) -> String {
        file.storage_key(&account())
    }
}
