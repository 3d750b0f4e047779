//! HTTP client for OnaData-compatible survey servers.
//!
//! Implements [`UpstreamApi`] over the server's REST endpoints:
//!
//! - `GET  {server}/api/v1/forms/{id}.json` form details
//! - `GET  {server}/api/v1/forms/{id}/export_async.json?format=csv` async export
//! - `GET  {server}/api/v1/user.json` temp token for private form downloads
//!
//! The client only classifies responses. Retry, backoff and token refresh
//! live in [`duva_core::ExportPoller`].

use std::path::Path;
use std::time::Duration;

use duva_core::error::AppError;
use duva_core::models::{ExportOptions, FormInfo};
use duva_core::{ExportJobStatus, HttpConfig, SecretString, UpstreamApi, UpstreamResponse};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

const FORMS_ENDPOINT: &str = "api/v1/forms";
const USER_ENDPOINT: &str = "api/v1/user.json";

/// Body of an `export_async.json` response.
///
/// `progress` is a free-form string on failure but may be a number or an
/// object while the job is still running.
#[derive(Deserialize, Debug, Default)]
struct ExportStatusBody {
    job_status: Option<String>,
    export_url: Option<String>,
    job_uuid: Option<String>,
    progress: Option<Value>,
}

impl ExportStatusBody {
    fn into_status(self) -> ExportJobStatus {
        match (self.job_status.as_deref(), self.export_url) {
            (Some("SUCCESS"), Some(export_url)) => ExportJobStatus::Success { export_url },
            (Some("FAILURE"), _) => ExportJobStatus::Failure {
                reason: match self.progress {
                    Some(Value::String(s)) => s,
                    Some(Value::Null) | None => "unknown".to_string(),
                    Some(other) => other.to_string(),
                },
            },
            _ => ExportJobStatus::Pending {
                job_uuid: self.job_uuid,
            },
        }
    }
}

#[derive(Deserialize, Debug)]
struct UserBody {
    temp_token: Option<String>,
}

/// HTTP client for an OnaData server.
///
/// One client serves every server: the base URL is passed per call because
/// each user account belongs to its own server.
///
/// # Examples
///
/// ```no_run
/// use duva_client::OnaDataClient;
/// use duva_core::{SecretString, UpstreamApi, UpstreamResponse};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = OnaDataClient::new()?;
/// let token = SecretString::new("access-token");
/// if let UpstreamResponse::Ok(form) = client.get_form("https://api.ona.io", token, 42).await? {
///     println!("{} (public: {})", form.title, form.public);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OnaDataClient {
    client: Client,
    api_timeout: Duration,
}

impl OnaDataClient {
    /// Creates a client with the default [`HttpConfig`].
    pub fn new() -> Result<Self, AppError> {
        Self::with_config(&HttpConfig::default())
    }

    /// Creates a client with explicit timeouts and user agent.
    ///
    /// JSON calls are bounded by `http_config.timeout`. Export downloads are
    /// bounded only by the connect and idle-read timeouts.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` if the underlying HTTP client cannot
    /// be built.
    pub fn with_config(http_config: &HttpConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: crate::http::build_client(http_config)?,
            api_timeout: http_config.timeout,
        })
    }

    fn base(server_url: &str) -> Result<Url, AppError> {
        let normalized = format!("{}/", server_url.trim_end_matches('/'));
        let url = Url::parse(&normalized)
            .map_err(|_| AppError::InvalidUrl(format!("Invalid server URL: {}", server_url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(AppError::InvalidUrl(format!(
                "unsupported scheme '{}' in {}",
                scheme, server_url
            ))),
        }
    }

    fn join(base: &Url, path: &str) -> Result<Url, AppError> {
        base.join(path)
            .map_err(|e| AppError::InvalidUrl(e.to_string()))
    }

    pub(crate) fn form_url(server_url: &str, form_id: i64) -> Result<Url, AppError> {
        Self::join(
            &Self::base(server_url)?,
            &format!("{}/{}.json", FORMS_ENDPOINT, form_id),
        )
    }

    pub(crate) fn export_url(
        server_url: &str,
        form_id: i64,
        options: &ExportOptions,
        job_uuid: Option<&str>,
    ) -> Result<Url, AppError> {
        let mut url = Self::join(
            &Self::base(server_url)?,
            &format!("{}/{}/export_async.json", FORMS_ENDPOINT, form_id),
        )?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "csv");
            for (key, value) in options.to_query_pairs() {
                pairs.append_pair(key, value);
            }
            if let Some(uuid) = job_uuid {
                pairs.append_pair("job_uuid", uuid);
            }
        }
        Ok(url)
    }

    pub(crate) fn user_url(server_url: &str) -> Result<Url, AppError> {
        Self::join(&Self::base(server_url)?, USER_ENDPOINT)
    }

    fn authorized_get(&self, url: Url, token: &SecretString) -> RequestBuilder {
        self.client.get(url).bearer_auth(token.expose())
    }

    async fn get(&self, url: Url, token: &SecretString) -> Result<Response, AppError> {
        self.authorized_get(url, token)
            .timeout(self.api_timeout)
            .send()
            .await
            .map_err(transport_error)
    }
}

/// Everything that never reached a status line is a connection problem.
fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::ConnectionRequest(format!("request timed out: {}", e))
    } else {
        AppError::ConnectionRequest(e.to_string())
    }
}

fn unexpected<T>(status: StatusCode) -> UpstreamResponse<T> {
    if status == StatusCode::UNAUTHORIZED {
        UpstreamResponse::Unauthorized
    } else {
        UpstreamResponse::Status(status.as_u16())
    }
}

impl UpstreamApi for OnaDataClient {
    async fn get_form(
        &self,
        server_url: &str,
        token: SecretString,
        form_id: i64,
    ) -> Result<UpstreamResponse<FormInfo>, AppError> {
        let resp = self.get(Self::form_url(server_url, form_id)?, &token).await?;
        if resp.status() != StatusCode::OK {
            return Ok(unexpected(resp.status()));
        }

        let form: FormInfo = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        Ok(UpstreamResponse::Ok(form))
    }

    async fn export_status(
        &self,
        server_url: &str,
        token: SecretString,
        form_id: i64,
        options: &ExportOptions,
        job_uuid: Option<&str>,
    ) -> Result<UpstreamResponse<ExportJobStatus>, AppError> {
        let url = Self::export_url(server_url, form_id, options, job_uuid)?;
        let resp = self.get(url, &token).await?;
        if resp.status() != StatusCode::ACCEPTED {
            return Ok(unexpected(resp.status()));
        }

        let body: ExportStatusBody = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        Ok(UpstreamResponse::Ok(body.into_status()))
    }

    async fn temp_token(
        &self,
        server_url: &str,
        token: SecretString,
    ) -> Result<UpstreamResponse<String>, AppError> {
        let resp = self.get(Self::user_url(server_url)?, &token).await?;
        if resp.status() != StatusCode::OK {
            return Ok(unexpected(resp.status()));
        }

        let body: UserBody = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        body.temp_token
            .map(UpstreamResponse::Ok)
            .ok_or_else(|| AppError::ClientError("user profile has no temp_token".to_string()))
    }

    async fn download(
        &self,
        url: &str,
        token: SecretString,
        dest: &Path,
    ) -> Result<UpstreamResponse<u64>, AppError> {
        let url = Url::parse(url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
        let resp = self
            .authorized_get(url, &token)
            .send()
            .await
            .map_err(transport_error)?;
        if resp.status() != StatusCode::OK {
            return Ok(unexpected(resp.status()));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport_error)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(bytes = written, path = %dest.display(), "Export downloaded");
        Ok(UpstreamResponse::Ok(written))
    }
}
