//! Trait definitions for external collaborators.
//!
//! The sync pipeline only talks to persistence, the upstream API, object
//! storage and the BI platform through these traits. Concrete
//! implementations live in `duva-db` and `duva-client`; the integration
//! tests use in-memory mocks.
//!
//! # Example
//!
//! ```ignore
//! use duva_core::traits::{FileStore, ObjectStorage};
//!
//! async fn drop_artifact<S, O>(store: &S, storage: &O, file_id: i64) -> Result<(), duva_core::AppError>
//! where
//!     S: FileStore,
//!     O: ObjectStorage,
//! {
//!     if let Some(file) = store.get_file(file_id).await? {
//!         storage.delete(&format!("{}/{}", file.user_id, file.filename)).await?;
//!     }
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::crypto::{EncryptedSecret, SecretString};
use crate::error::AppError;
use crate::models::{
    ExportOptions, FileStatus, FormInfo, JobMetadata, NewPublishTarget, NewTrackedFile,
    PublishTarget, TrackedFile, UpstreamCredential, UserAccount,
};

// =============================================================================
// Persistence
// =============================================================================

/// Store for tracked files.
pub trait FileStore: Send + Sync + Clone {
    fn get_file(&self, id: i64)
    -> impl Future<Output = Result<Option<TrackedFile>, AppError>> + Send;

    /// Files owned by `user_id`, optionally narrowed to one form.
    fn list_files(
        &self,
        user_id: i64,
        form_id: Option<i64>,
    ) -> impl Future<Output = Result<Vec<TrackedFile>, AppError>> + Send;

    /// Every file with `is_active = true`.
    fn list_active(&self) -> impl Future<Output = Result<Vec<TrackedFile>, AppError>> + Send;

    fn find_by_form(
        &self,
        user_id: i64,
        form_id: i64,
    ) -> impl Future<Output = Result<Option<TrackedFile>, AppError>> + Send;

    /// Insert a file. Fails with [`AppError::Conflict`] when the
    /// `(user_id, form_id)` pair is taken.
    fn create_file(
        &self,
        file: &NewTrackedFile,
    ) -> impl Future<Output = Result<TrackedFile, AppError>> + Send;

    /// Persist only the status column.
    fn set_status(
        &self,
        id: i64,
        status: FileStatus,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Persist the outcome of a run: status, metadata, `is_active` and the
    /// sync timestamps. `filename` and `publish_target_id` are left alone.
    fn save_sync_state(
        &self,
        file: &TrackedFile,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Persist only the job metadata.
    fn set_metadata(
        &self,
        id: i64,
        metadata: &JobMetadata,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Persist only `is_active`.
    fn set_active(&self, id: i64, active: bool)
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// Persist only the publish target reference.
    fn set_publish_target(
        &self,
        id: i64,
        target_id: Option<i64>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Returns false if the file did not exist.
    fn delete_file(&self, id: i64) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Store for BI publish configurations.
pub trait PublishTargetStore: Send + Sync + Clone {
    fn get_target(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<PublishTarget>, AppError>> + Send;

    fn list_targets(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Vec<PublishTarget>, AppError>> + Send;

    fn create_target(
        &self,
        target: &NewPublishTarget,
    ) -> impl Future<Output = Result<PublishTarget, AppError>> + Send;

    fn update_target(
        &self,
        target: &PublishTarget,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn delete_target(&self, id: i64) -> impl Future<Output = Result<bool, AppError>> + Send;
}

/// Store for users, their upstream server and their token pair.
pub trait AccountStore: Send + Sync + Clone {
    fn get_account(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<UserAccount>, AppError>> + Send;

    fn get_credential(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<UpstreamCredential>, AppError>> + Send;

    /// Replace the token pair only if the stored refresh token still equals
    /// `previous_refresh`. Returns false when another refresh won the race.
    fn rotate_tokens(
        &self,
        user_id: i64,
        previous_refresh: &EncryptedSecret,
        access_token: &EncryptedSecret,
        refresh_token: &EncryptedSecret,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;
}

// =============================================================================
// Upstream API
// =============================================================================

/// Supplies bearer tokens for the upstream API.
pub trait CredentialBroker: Send + Sync + Clone {
    /// The current access token, refreshing first if none is stored.
    fn access_token(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<SecretString, AppError>> + Send;

    /// Exchange the refresh token for a new pair and persist it.
    fn refresh_access_token(
        &self,
        user_id: i64,
    ) -> impl Future<Output = Result<SecretString, AppError>> + Send;
}

/// Response classification shared by all upstream calls.
///
/// `Unauthorized` lets the caller refresh the token and retry once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamResponse<T> {
    Ok(T),
    Unauthorized,
    /// Any other unexpected HTTP status.
    Status(u16),
}

/// State of an asynchronous export job as reported upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportJobStatus {
    /// Still running; `job_uuid` addresses the same job on the next poll.
    Pending { job_uuid: Option<String> },
    Success { export_url: String },
    Failure { reason: String },
}

/// Thin transport over the upstream survey API.
pub trait UpstreamApi: Send + Sync + Clone {
    fn get_form(
        &self,
        server_url: &str,
        token: SecretString,
        form_id: i64,
    ) -> impl Future<Output = Result<UpstreamResponse<FormInfo>, AppError>> + Send;

    /// Request (or re-poll) an async CSV export. Only HTTP 202 maps to
    /// `UpstreamResponse::Ok`.
    fn export_status(
        &self,
        server_url: &str,
        token: SecretString,
        form_id: i64,
        options: &ExportOptions,
        job_uuid: Option<&str>,
    ) -> impl Future<Output = Result<UpstreamResponse<ExportJobStatus>, AppError>> + Send;

    /// Short-lived token that authorizes export downloads of private forms.
    fn temp_token(
        &self,
        server_url: &str,
        token: SecretString,
    ) -> impl Future<Output = Result<UpstreamResponse<String>, AppError>> + Send;

    /// Stream `url` into `dest`, returning the number of bytes written.
    fn download(
        &self,
        url: &str,
        token: SecretString,
        dest: &Path,
    ) -> impl Future<Output = Result<UpstreamResponse<u64>, AppError>> + Send;
}

// =============================================================================
// Object storage & publishing
// =============================================================================

/// Artifact storage.
pub trait ObjectStorage: Send + Sync + Clone {
    /// Upload the file at `local` under `key`, replacing any previous object.
    fn put_file(
        &self,
        local: &Path,
        key: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Download `key` into `dest`.
    fn get_to_path(
        &self,
        key: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Remove `key`. A missing object is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Time-limited GET URL for `key`.
    fn presign(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Downstream BI platform.
pub trait PublishClient: Send + Sync + Clone {
    /// Sign in and out again. Invalid configuration yields
    /// [`AppError::PublishValidation`].
    fn validate(&self, target: &PublishTarget)
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// Publish `extract` into the target project, overwriting any existing
    /// datasource of the same name.
    fn publish(
        &self,
        target: &PublishTarget,
        extract: &Path,
        datasource_name: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
