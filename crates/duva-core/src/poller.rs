//! Export poller: turns an upstream async CSV export into a local file.
//!
//! # Protocol
//!
//! ```text
//! GET {server}/api/v1/forms/{id}.json             form visibility
//! GET {server}/api/v1/user.json                   temp_token (private forms only)
//! GET {server}/api/v1/forms/{id}/export_async.json?format=csv&<options>[&job_uuid=..]
//!     202 {job_status: PENDING, job_uuid}        → sleep base_delay * attempt, poll again
//!     202 {job_status: SUCCESS, export_url}      → download
//!     202 {job_status: FAILURE, progress}        → Failure(progress)
//!     anything else                              → ConnectionRequest error
//! ```
//!
//! Every request goes through [`ExportPoller::authorized`]: a 401 triggers
//! exactly one token refresh and one retry of the same request.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use url::Url;

use crate::config::PollerConfig;
use crate::crypto::SecretString;
use crate::error::AppError;
use crate::models::{ExportOptions, FormInfo, UserAccount};
use crate::traits::{CredentialBroker, ExportJobStatus, UpstreamApi, UpstreamResponse};

/// Result of one export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// CSV downloaded to this path.
    Success(PathBuf),
    /// Upstream reported the export failed.
    Failure(String),
    /// Still pending after the attempt budget was spent.
    TimedOut,
}

impl ExportOutcome {
    /// Collapse into the error taxonomy used by the orchestrator.
    pub fn into_path(self) -> Result<PathBuf, AppError> {
        match self {
            ExportOutcome::Success(path) => Ok(path),
            ExportOutcome::Failure(reason) => Err(AppError::CsvExportFailure(reason)),
            ExportOutcome::TimedOut => Err(AppError::ConnectionRequest(
                "export still pending after all poll attempts".to_string(),
            )),
        }
    }
}

/// Append the private-form `temp_token` to the export download URL.
fn with_temp_token(export_url: &str, temp_token: Option<&str>) -> Result<String, AppError> {
    let Some(token) = temp_token else {
        return Ok(export_url.to_string());
    };
    let mut url = Url::parse(export_url)
        .map_err(|e| AppError::InvalidUrl(format!("export URL {}: {}", export_url, e)))?;
    url.query_pairs_mut().append_pair("temp_token", token);
    Ok(url.into())
}

/// Polls the upstream export endpoint with a bounded attempt budget.
#[derive(Clone)]
pub struct ExportPoller<U, B>
where
    U: UpstreamApi,
    B: CredentialBroker,
{
    api: U,
    broker: B,
    config: PollerConfig,
}

impl<U, B> ExportPoller<U, B>
where
    U: UpstreamApi,
    B: CredentialBroker,
{
    pub fn new(api: U, broker: B, config: PollerConfig) -> Self {
        Self {
            api,
            broker,
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run `call` with the user's token, refreshing once on 401.
    ///
    /// The inner `Err` carries any other unexpected HTTP status. A second
    /// 401 becomes [`AppError::Unauthorized`].
    pub async fn authorized<T, F, Fut>(
        &self,
        user_id: i64,
        mut call: F,
    ) -> Result<Result<T, u16>, AppError>
    where
        F: FnMut(SecretString) -> Fut,
        Fut: Future<Output = Result<UpstreamResponse<T>, AppError>>,
    {
        let token = self.broker.access_token(user_id).await?;
        let response = match call(token).await? {
            UpstreamResponse::Unauthorized => {
                debug!(user_id, "Access token rejected, refreshing");
                let token = self.broker.refresh_access_token(user_id).await?;
                call(token).await?
            }
            other => other,
        };

        match response {
            UpstreamResponse::Ok(value) => Ok(Ok(value)),
            UpstreamResponse::Status(code) => Ok(Err(code)),
            UpstreamResponse::Unauthorized => Err(AppError::Unauthorized(format!(
                "upstream rejected refreshed token for user {}",
                user_id
            ))),
        }
    }

    /// Fetch form details (title, visibility, encryption).
    pub async fn fetch_form(&self, account: &UserAccount, form_id: i64) -> Result<FormInfo, AppError> {
        let api = &self.api;
        let server = account.server_url.as_str();
        match self
            .authorized(account.id, |token| api.get_form(server, token, form_id))
            .await?
        {
            Ok(form) => Ok(form),
            Err(404) => Err(AppError::NotFound(format!("Form {}", form_id))),
            Err(code) => {
                Err(AppError::ConnectionRequest(format!(
                    "unexpected status {} fetching form {}",
                    code, form_id
                )))
            }
        }
    }

    /// Request a CSV export of `form_id` and download it into `dest_dir`.
    pub async fn request_export(
        &self,
        account: &UserAccount,
        form_id: i64,
        options: &ExportOptions,
        dest_dir: &Path,
    ) -> Result<ExportOutcome, AppError> {
        let form = self.fetch_form(account, form_id).await?;
        let temp_token = if form.public {
            None
        } else {
            Some(self.fetch_temp_token(account).await?)
        };

        let api = &self.api;
        let server = account.server_url.as_str();
        let mut job_uuid: Option<String> = None;

        for attempt in 1..=self.config.max_attempts {
            let uuid = job_uuid.as_deref();
            let response = self
                .authorized(account.id, |token| {
                    api.export_status(server, token, form_id, options, uuid)
                })
                .await?;

            let status = match response {
                Ok(status) => status,
                Err(code) => {
                    return Err(AppError::ConnectionRequest(format!(
                        "export request for form {} returned status {}",
                        form_id, code
                    )));
                }
            };

            match status {
                ExportJobStatus::Success { export_url } => {
                    let url = with_temp_token(&export_url, temp_token.as_deref())?;
                    let dest = dest_dir.join(format!("{}.csv", form_id));
                    self.download(account.id, &url, &dest).await?;
                    info!(form_id, attempt, path = %dest.display(), "Export downloaded");
                    return Ok(ExportOutcome::Success(dest));
                }
                ExportJobStatus::Failure { reason } => {
                    warn!(form_id, %reason, "Upstream export failed");
                    return Ok(ExportOutcome::Failure(reason));
                }
                ExportJobStatus::Pending { job_uuid: uuid } => {
                    if uuid.is_some() {
                        job_uuid = uuid;
                    }
                    if attempt < self.config.max_attempts {
                        let delay = self.config.delay_after_attempt(attempt);
                        debug!(form_id, attempt, ?delay, "Export pending");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(
            form_id,
            attempts = self.config.max_attempts,
            "Export still pending, giving up"
        );
        Ok(ExportOutcome::TimedOut)
    }

    async fn fetch_temp_token(&self, account: &UserAccount) -> Result<String, AppError> {
        let api = &self.api;
        let server = account.server_url.as_str();
        match self
            .authorized(account.id, |token| api.temp_token(server, token))
            .await?
        {
            Ok(token) => Ok(token),
            Err(code) => {
                Err(AppError::ConnectionRequest(format!(
                    "unexpected status {} fetching temp token",
                    code
                )))
            }
        }
    }

    /// Download with up to `download_retries` extra attempts on non-200.
    async fn download(&self, user_id: i64, url: &str, dest: &Path) -> Result<u64, AppError> {
        let api = &self.api;
        let mut last_status = 0;
        for attempt in 0..=self.config.download_retries {
            match self
                .authorized(user_id, |token| api.download(url, token, dest))
                .await?
            {
                Ok(bytes) => return Ok(bytes),
                Err(code) => {
                    warn!(attempt, status = code, "Export download failed");
                    last_status = code;
                }
            }
        }
        Err(AppError::ConnectionRequest(format!(
            "export download failed with status {}",
            last_status
        )))
    }
}
