//! Domain models for tracked files, publish targets and upstream accounts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::crypto::EncryptedSecret;

// =============================================================================
// File Status
// =============================================================================

/// Sync status of a tracked file.
///
/// ```text
/// Unavailable → Queued → Syncing → Available
///                           ↑   ↘
///                           └──── SyncFailed
/// ```
///
/// The persisted form is the human readable label returned by [`as_str`](Self::as_str).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FileStatus {
    /// No extract has been produced yet, or the last export was empty.
    #[default]
    #[serde(rename = "File unavailable")]
    Unavailable,
    /// A run has been requested but has not started.
    #[serde(rename = "Sync Queued")]
    Queued,
    /// A run is in progress.
    #[serde(rename = "Syncing file")]
    Syncing,
    /// The latest run stored a fresh extract.
    #[serde(rename = "File available")]
    Available,
    /// The latest run failed; the previous extract (if any) is still stored.
    #[serde(rename = "Latest Sync Failed")]
    SyncFailed,
}

impl FileStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Unavailable => "File unavailable",
            FileStatus::Queued => "Sync Queued",
            FileStatus::Syncing => "Syncing file",
            FileStatus::Available => "File available",
            FileStatus::SyncFailed => "Latest Sync Failed",
        }
    }

    /// Returns true while a run is requested or executing.
    ///
    /// Manual sync requests are refused in these states.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, FileStatus::Queued | FileStatus::Syncing)
    }
}

/// Error type for parsing FileStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFileStatusError(String);

impl fmt::Display for ParseFileStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid file status: {}", self.0)
    }
}

impl std::error::Error for ParseFileStatusError {}

impl FromStr for FileStatus {
    type Err = ParseFileStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "File unavailable" => Ok(FileStatus::Unavailable),
            "Sync Queued" => Ok(FileStatus::Queued),
            "Syncing file" => Ok(FileStatus::Syncing),
            "File available" => Ok(FileStatus::Available),
            "Latest Sync Failed" => Ok(FileStatus::SyncFailed),
            _ => Err(ParseFileStatusError(s.to_string())),
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Job Metadata
// =============================================================================

/// Scheduler bookkeeping stored alongside each tracked file.
///
/// Persisted as `{"job-id": "<handle or empty>", "sync-failures": <int>}`.
/// A `"failure-reason"` key is present only while a failure reason is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JobMetadata {
    /// Scheduler handle, empty when no recurring job is registered.
    #[serde(rename = "job-id")]
    pub job_id: String,
    /// Consecutive failed runs since the last success or cancellation.
    #[serde(rename = "sync-failures")]
    pub sync_failures: u32,
    /// Reason recorded by the most recent failed run.
    #[serde(rename = "failure-reason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl JobMetadata {
    /// Returns true when a recurring job handle is recorded.
    pub fn is_scheduled(&self) -> bool {
        !self.job_id.is_empty()
    }

    /// Forget the job handle and reset the failure counter.
    pub fn clear_job(&mut self) {
        self.job_id.clear();
        self.sync_failures = 0;
    }
}

// Older rows stored `job-id` as the integer 0 and occasionally left
// `sync-failures` as a string; both read back as the empty state.
impl<'de> Deserialize<'de> for JobMetadata {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(rename = "job-id", default)]
            job_id: Value,
            #[serde(rename = "sync-failures", default)]
            sync_failures: Value,
            #[serde(rename = "failure-reason", default)]
            failure_reason: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let job_id = match raw.job_id {
            Value::String(s) => s,
            _ => String::new(),
        };
        let sync_failures = raw
            .sync_failures
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);

        Ok(Self {
            job_id,
            sync_failures,
            failure_reason: raw.failure_reason,
        })
    }
}

// =============================================================================
// Tracked File
// =============================================================================

/// One form-to-extract binding owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFile {
    pub id: i64,
    pub user_id: i64,
    /// Upstream form identifier, unique per user.
    pub form_id: i64,
    /// Extract filename, derived from the form title at registration.
    pub filename: String,
    pub status: FileStatus,
    pub metadata: JobMetadata,
    /// When false the recurring job must not be (re)scheduled.
    pub is_active: bool,
    /// Last successful content refresh.
    pub last_updated: Option<DateTime<Utc>>,
    /// Last completed run, successful or not.
    pub last_synced: Option<DateTime<Utc>>,
    /// Optional BI publish configuration.
    pub publish_target_id: Option<i64>,
}

impl TrackedFile {
    /// Object storage key: `{server_id}/{username}/{form_id}_{filename}`.
    pub fn storage_key(&self, account: &UserAccount) -> String {
        format!(
            "{}/{}/{}_{}",
            account.server_id, account.username, self.form_id, self.filename
        )
    }
}

/// Data needed to insert a tracked file.
#[derive(Debug, Clone)]
pub struct NewTrackedFile {
    pub user_id: i64,
    pub form_id: i64,
    pub filename: String,
    pub status: FileStatus,
    pub publish_target_id: Option<i64>,
}

// =============================================================================
// Export Options
// =============================================================================

/// Export-shaping flags forwarded to the upstream export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub include_labels: bool,
    pub remove_group_name: bool,
    pub do_not_split_select_multiple: bool,
    pub include_reviews: bool,
    pub include_labels_only: bool,
    pub value_select_multiples: bool,
    pub show_choice_labels: bool,
    pub binary_select_multiples: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_labels: true,
            remove_group_name: true,
            do_not_split_select_multiple: false,
            include_reviews: false,
            include_labels_only: true,
            value_select_multiples: true,
            show_choice_labels: true,
            binary_select_multiples: true,
        }
    }
}

impl ExportOptions {
    /// Query parameters in a stable order.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, &'static str)> {
        let flag = |b: bool| if b { "true" } else { "false" };
        vec![
            ("include_labels", flag(self.include_labels)),
            ("remove_group_name", flag(self.remove_group_name)),
            (
                "do_not_split_select_multiple",
                flag(self.do_not_split_select_multiple),
            ),
            ("include_reviews", flag(self.include_reviews)),
            ("include_labels_only", flag(self.include_labels_only)),
            ("value_select_multiples", flag(self.value_select_multiples)),
            ("show_choice_labels", flag(self.show_choice_labels)),
            ("binary_select_multiples", flag(self.binary_select_multiples)),
        ]
    }
}

// =============================================================================
// Publish Target
// =============================================================================

/// BI platform configuration a tracked file can publish to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishTarget {
    pub id: i64,
    pub user_id: i64,
    pub server_address: String,
    /// Site content URL; empty for the default site.
    pub site_name: String,
    pub token_name: String,
    pub token_value: EncryptedSecret,
    pub project_name: String,
    pub export_settings: ExportOptions,
}

/// Data needed to insert a publish target. The token is already encrypted.
#[derive(Debug, Clone)]
pub struct NewPublishTarget {
    pub user_id: i64,
    pub server_address: String,
    pub site_name: String,
    pub token_name: String,
    pub token_value: EncryptedSecret,
    pub project_name: String,
    pub export_settings: ExportOptions,
}

// =============================================================================
// Upstream accounts
// =============================================================================

/// A registered upstream data server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: i64,
    pub url: String,
    pub client_id: String,
    pub client_secret: EncryptedSecret,
}

/// The identity needed to address a user's files upstream and in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub server_id: i64,
    pub server_url: String,
    pub username: String,
}

/// Per-user token pair plus the OAuth client of the user's server.
#[derive(Debug, Clone)]
pub struct UpstreamCredential {
    pub user_id: i64,
    pub server_url: String,
    pub client_id: String,
    pub client_secret: EncryptedSecret,
    pub refresh_token: EncryptedSecret,
    pub access_token: Option<EncryptedSecret>,
}

/// Form details returned by the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FormInfo {
    #[serde(rename = "formid")]
    pub form_id: i64,
    pub title: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub public: bool,
}

impl FormInfo {
    /// Encrypted forms carry a non-empty public key.
    pub fn is_encrypted(&self) -> bool {
        self.public_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}
