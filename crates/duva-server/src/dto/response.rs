//! Response DTOs for API endpoints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use duva_core::{DownloadLink, ExportOptions, PublishTarget, ServerRecord, TrackedFile, UserAccount};

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub version: String,
    pub database: ServiceStatus,
}

/// Status of an individual service component.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// =============================================================================
// Accounts
// =============================================================================

/// A registered upstream server. The client secret is never returned.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServerResponse {
    pub id: i64,
    pub url: String,
    pub client_id: String,
}

impl From<ServerRecord> for ServerResponse {
    fn from(s: ServerRecord) -> Self {
        Self {
            id: s.id,
            url: s.url,
            client_id: s.client_id,
        }
    }
}

/// A user on an upstream server.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub server_id: i64,
    pub server_url: String,
    pub username: String,
}

impl From<UserAccount> for UserResponse {
    fn from(u: UserAccount) -> Self {
        Self {
            id: u.id,
            server_id: u.server_id,
            server_url: u.server_url,
            username: u.username,
        }
    }
}

// =============================================================================
// Publish configurations
// =============================================================================

/// A BI publish configuration. The token secret is never returned.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigurationResponse {
    pub id: i64,
    pub user_id: i64,
    pub server_address: String,
    pub site_name: String,
    pub token_name: String,
    pub project_name: String,
    #[schema(value_type = Object)]
    pub export_settings: ExportOptions,
}

impl From<PublishTarget> for ConfigurationResponse {
    fn from(t: PublishTarget) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            server_address: t.server_address,
            site_name: t.site_name,
            token_name: t.token_name,
            project_name: t.project_name,
            export_settings: t.export_settings,
        }
    }
}

// =============================================================================
// Tracked files
// =============================================================================

/// A tracked form and the state of its extract.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: i64,
    pub user_id: i64,
    pub form_id: i64,
    pub filename: String,
    /// Human readable status, e.g. "File available"
    #[schema(example = "File available")]
    pub status: String,
    pub is_active: bool,
    pub publish_target_id: Option<i64>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_synced: Option<DateTime<Utc>>,
    pub sync_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Presigned URL of the latest extract, absent until one is stored
    pub download_url: Option<String>,
    pub valid_till: Option<DateTime<Utc>>,
}

impl FileResponse {
    pub fn new(file: TrackedFile, link: Option<DownloadLink>) -> Self {
        let (download_url, valid_till) = match link {
            Some(link) => (Some(link.url), Some(link.valid_till)),
            None => (None, None),
        };

        Self {
            id: file.id,
            user_id: file.user_id,
            form_id: file.form_id,
            filename: file.filename,
            status: file.status.to_string(),
            is_active: file.is_active,
            publish_target_id: file.publish_target_id,
            last_updated: file.last_updated,
            last_synced: file.last_synced,
            sync_failures: file.metadata.sync_failures,
            failure_reason: file.metadata.failure_reason,
            download_url,
            valid_till,
        }
    }
}

/// Outcome of a manual sync request.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    #[schema(example = "Sync queued")]
    pub message: String,
}
