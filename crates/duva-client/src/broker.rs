//! OAuth2 refresh-token broker for OnaData servers.
//!
//! Tokens are stored encrypted through [`AccountStore`]. A refresh posts the
//! stored refresh token to `{server}/o/token/` and rotates both tokens with a
//! compare-and-swap on the previous refresh token, so two processes that
//! refresh concurrently never overwrite each other's result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use duva_core::error::AppError;
use duva_core::{
    AccountStore, CredentialBroker, HttpConfig, SecretCipher, SecretString, UpstreamCredential,
};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

const TOKEN_ENDPOINT: &str = "o/token/";

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    /// Some servers keep the old refresh token and omit this field.
    refresh_token: Option<String>,
}

/// Form body of a refresh-token grant.
pub(crate) fn refresh_form(
    refresh_token: &SecretString,
    client_id: &str,
) -> [(&'static str, String); 3] {
    [
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.expose().to_string()),
        ("client_id", client_id.to_string()),
    ]
}

pub(crate) fn token_url(server_url: &str) -> Result<Url, AppError> {
    let base = Url::parse(&format!("{}/", server_url.trim_end_matches('/')))
        .map_err(|_| AppError::InvalidUrl(format!("Invalid server URL: {}", server_url)))?;
    base.join(TOKEN_ENDPOINT)
        .map_err(|e| AppError::InvalidUrl(e.to_string()))
}

/// [`CredentialBroker`] backed by an [`AccountStore`].
///
/// Refreshes for the same user are serialized inside the process; the
/// store's compare-and-swap handles refreshes racing from other processes.
#[derive(Clone)]
pub struct OnaTokenBroker<A: AccountStore> {
    accounts: A,
    cipher: SecretCipher,
    client: Client,
    timeout: Duration,
    refresh_locks: Arc<Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<A: AccountStore> OnaTokenBroker<A> {
    pub fn new(accounts: A, cipher: SecretCipher) -> Result<Self, AppError> {
        Self::with_config(accounts, cipher, &HttpConfig::default())
    }

    pub fn with_config(
        accounts: A,
        cipher: SecretCipher,
        http_config: &HttpConfig,
    ) -> Result<Self, AppError> {
        Ok(Self {
            accounts,
            cipher,
            client: crate::http::build_client(http_config)?,
            timeout: http_config.timeout,
            refresh_locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn refresh_lock(&self, user_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(user_id).or_default().clone()
    }

    async fn credential(&self, user_id: i64) -> Result<UpstreamCredential, AppError> {
        self.accounts
            .get_credential(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("credentials for user {}", user_id)))
    }

    /// Exchange `credential`'s refresh token at the server.
    async fn exchange(&self, credential: &UpstreamCredential) -> Result<TokenResponse, AppError> {
        let refresh_token = self.cipher.decrypt(&credential.refresh_token)?;
        let client_secret = self.cipher.decrypt(&credential.client_secret)?;

        let resp = self
            .client
            .post(token_url(&credential.server_url)?)
            .basic_auth(&credential.client_id, Some(client_secret.expose()))
            .form(&refresh_form(&refresh_token, &credential.client_id))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::ConnectionRequest(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json()
                .await
                .map_err(|e| AppError::ClientError(e.to_string())),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(AppError::Unauthorized(
                format!("token refresh rejected for user {}", credential.user_id),
            )),
            status => Err(AppError::ConnectionRequest(format!(
                "token endpoint returned {}",
                status
            ))),
        }
    }
}

impl<A: AccountStore> CredentialBroker for OnaTokenBroker<A> {
    async fn access_token(&self, user_id: i64) -> Result<SecretString, AppError> {
        let credential = self.credential(user_id).await?;
        match &credential.access_token {
            Some(token) => self.cipher.decrypt(token),
            None => self.refresh_access_token(user_id).await,
        }
    }

    async fn refresh_access_token(&self, user_id: i64) -> Result<SecretString, AppError> {
        let seen = self.credential(user_id).await?.refresh_token;

        let lock = self.refresh_lock(user_id);
        let _guard = lock.lock().await;

        let credential = self.credential(user_id).await?;
        if credential.refresh_token != seen {
            if let Some(token) = &credential.access_token {
                tracing::debug!(user_id, "Token already refreshed by a concurrent caller");
                return self.cipher.decrypt(token);
            }
        }

        let response = self.exchange(&credential).await?;
        let access = self.cipher.encrypt(&response.access_token)?;
        let refresh = match &response.refresh_token {
            Some(token) => self.cipher.encrypt(token)?,
            None => credential.refresh_token.clone(),
        };

        let rotated = self
            .accounts
            .rotate_tokens(user_id, &credential.refresh_token, &access, &refresh)
            .await?;

        if rotated {
            tracing::info!(user_id, "Access token refreshed");
            return Ok(SecretString::new(response.access_token));
        }

        // Another process rotated first; its pair is the live one.
        tracing::info!(user_id, "Lost token rotation race, using stored token");
        let winner = self.credential(user_id).await?;
        match &winner.access_token {
            Some(token) => self.cipher.decrypt(token),
            None => Err(AppError::Unauthorized(format!(
                "no access token stored for user {}",
                user_id
            ))),
        }
    }
}
