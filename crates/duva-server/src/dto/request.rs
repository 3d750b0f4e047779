//! Request DTOs for API endpoints.

use serde::{Deserialize, Deserializer};
use utoipa::{IntoParams, ToSchema};

use duva_core::ExportOptions;

/// Register an upstream data server and its OAuth client.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateServerRequest {
    #[schema(example = "https://api.ona.io")]
    pub url: String,
    pub client_id: String,
    /// Stored encrypted, never returned
    pub client_secret: String,
}

/// Bootstrap a user's upstream credentials.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub server_id: i64,
    pub username: String,
    /// Stored encrypted, never returned
    pub refresh_token: String,
    /// Optional current access token; fetched on first use otherwise
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Create a BI publish configuration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConfigurationRequest {
    #[schema(example = "https://tableau.example.com")]
    pub server_address: String,
    /// Site content URL, empty for the default site
    #[serde(default)]
    pub site_name: String,
    pub token_name: String,
    /// Personal access token secret. Stored encrypted, never returned
    pub token_value: String,
    pub project_name: String,
    /// Export shaping flags; server defaults apply when omitted
    #[serde(default)]
    #[schema(value_type = Object)]
    pub export_settings: Option<ExportOptions>,
}

/// Partial update of a BI publish configuration.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateConfigurationRequest {
    pub server_address: Option<String>,
    pub site_name: Option<String>,
    pub token_name: Option<String>,
    pub token_value: Option<String>,
    pub project_name: Option<String>,
    #[schema(value_type = Object)]
    pub export_settings: Option<ExportOptions>,
}

/// Filters for listing a user's files.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct FileQuery {
    /// Only return the file tracking this upstream form
    pub form_id: Option<i64>,
}

/// Start tracking an upstream form.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFileRequest {
    #[schema(example = 4412)]
    pub form_id: i64,
    #[serde(default)]
    pub publish_target_id: Option<i64>,
    /// Queue a run immediately instead of waiting for the schedule
    #[serde(default)]
    pub sync_now: bool,
}

/// Partial update of a tracked file.
///
/// `"publish_target_id": null` detaches the target; omitting the key leaves
/// it unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateFileRequest {
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<i64>)]
    pub publish_target_id: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

/// Wraps whatever was sent, including `null`, so an absent key stays `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
