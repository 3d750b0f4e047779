//! Shared reqwest client construction.

use duva_core::HttpConfig;
use duva_core::error::AppError;
use reqwest::Client;

/// Client with connect and idle-read limits but no total deadline.
///
/// Transfers run as long as bytes keep flowing. Short API calls add
/// `HttpConfig::timeout` per request with `RequestBuilder::timeout`.
pub(crate) fn build_client(http_config: &HttpConfig) -> Result<Client, AppError> {
    Client::builder()
        .user_agent(&http_config.user_agent)
        .connect_timeout(http_config.connect_timeout)
        .read_timeout(http_config.read_timeout)
        .build()
        .map_err(|e| AppError::ClientError(e.to_string()))
}
