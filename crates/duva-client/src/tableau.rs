//! Tableau REST API publisher.
//!
//! Publishes extracts as datasources using a personal access token (PAT):
//!
//! 1. `POST /api/{version}/auth/signin` with the PAT, yielding a session
//!    token and the site id
//! 2. `GET  /api/{version}/sites/{site}/projects?filter=name:eq:{project}`
//! 3. `POST /api/{version}/sites/{site}/datasources?overwrite=true` as a
//!    `multipart/mixed` request
//! 4. `POST /api/{version}/auth/signout`
//!
//! The datasource endpoint only takes `hyper`, `tds`, `tdsx` and `tde`
//! files. Any other extract is wrapped in a `.tdsx` package: a `.tds`
//! document with a Parquet file connection plus the file under `Data/`.
//! Tableau 2022.1 or later is needed to open it.
//!
//! REST API reference:
//! <https://help.tableau.com/current/api/rest_api/en-us/REST/rest_api_ref.htm>

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use duva_core::error::AppError;
use duva_core::models::PublishTarget;
use duva_core::{HttpConfig, PublishClient, SecretCipher};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// REST API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "3.19";

const AUTH_HEADER: &str = "X-Tableau-Auth";

/// File types the datasource endpoint accepts as they are.
const PUBLISHABLE_TYPES: [&str; 4] = ["hyper", "tds", "tdsx", "tde"];

const PACKAGE_TYPE: &str = "tdsx";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    credentials: SignInCredentials<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInCredentials<'a> {
    personal_access_token_name: &'a str,
    personal_access_token_secret: &'a str,
    site: SiteRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteRef<'a> {
    content_url: &'a str,
}

#[derive(Deserialize, Debug)]
struct SignInResponse {
    credentials: SessionCredentials,
}

#[derive(Deserialize, Debug)]
struct SessionCredentials {
    token: String,
    site: SessionSite,
}

#[derive(Deserialize, Debug)]
struct SessionSite {
    id: String,
}

#[derive(Deserialize, Debug)]
struct ProjectsResponse {
    projects: ProjectList,
}

#[derive(Deserialize, Debug, Default)]
struct ProjectList {
    #[serde(default)]
    project: Vec<Project>,
}

#[derive(Deserialize, Debug)]
struct Project {
    id: String,
    name: String,
}

/// An authenticated REST session.
struct Session {
    token: String,
    site_id: String,
}

// =============================================================================
// Client
// =============================================================================

/// [`PublishClient`] for Tableau Server and Tableau Cloud.
///
/// The PAT secret is stored encrypted on the [`PublishTarget`]; the client
/// decrypts it per request and never keeps it.
///
/// # Examples
///
/// ```no_run
/// use duva_client::TableauClient;
/// use duva_core::{PublishClient, SecretCipher};
///
/// # async fn example(target: duva_core::PublishTarget) -> Result<(), Box<dyn std::error::Error>> {
/// let cipher = SecretCipher::from_secret_key("process secret")?;
/// let client = TableauClient::new(cipher)?;
/// client.validate(&target).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TableauClient {
    client: Client,
    timeout: Duration,
    cipher: SecretCipher,
    api_version: String,
}

impl TableauClient {
    pub fn new(cipher: SecretCipher) -> Result<Self, AppError> {
        Self::with_config(cipher, &HttpConfig::default())
    }

    pub fn with_config(cipher: SecretCipher, http_config: &HttpConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: crate::http::build_client(http_config)?,
            timeout: http_config.timeout,
            cipher,
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Pin a different REST API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub(crate) fn api_url(&self, server_address: &str, path: &str) -> Result<Url, AppError> {
        let base = Url::parse(&format!("{}/", server_address.trim_end_matches('/')))
            .map_err(|_| AppError::InvalidUrl(format!("Invalid server address: {}", server_address)))?;
        base.join(&format!("api/{}/{}", self.api_version, path))
            .map_err(|e| AppError::InvalidUrl(e.to_string()))
    }

    async fn sign_in(&self, target: &PublishTarget) -> Result<Session, AppError> {
        let secret = self.cipher.decrypt(&target.token_value)?;
        let body = SignInRequest {
            credentials: SignInCredentials {
                personal_access_token_name: &target.token_name,
                personal_access_token_secret: secret.expose(),
                site: SiteRef {
                    content_url: &target.site_name,
                },
            },
        };

        let resp = self
            .client
            .post(self.api_url(&target.server_address, "auth/signin")?)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(AppError::PublishValidation(format!(
                "sign-in to {} failed with status {}",
                target.server_address,
                resp.status()
            )));
        }

        let parsed: SignInResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        Ok(Session {
            token: parsed.credentials.token,
            site_id: parsed.credentials.site.id,
        })
    }

    async fn sign_out(&self, target: &PublishTarget, session: &Session) -> Result<(), AppError> {
        let resp = self
            .client
            .post(self.api_url(&target.server_address, "auth/signout")?)
            .header(AUTH_HEADER, &session.token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::ClientError(format!(
                "sign-out returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn find_project(
        &self,
        target: &PublishTarget,
        session: &Session,
    ) -> Result<String, AppError> {
        let mut url = self.api_url(
            &target.server_address,
            &format!("sites/{}/projects", session.site_id),
        )?;
        url.query_pairs_mut()
            .append_pair("filter", &format!("name:eq:{}", target.project_name));

        let resp = self
            .client
            .get(url)
            .header(AUTH_HEADER, &session.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AppError::ClientError(format!(
                "project lookup returned {}",
                resp.status()
            )));
        }

        let parsed: ProjectsResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;
        parsed
            .projects
            .project
            .into_iter()
            .find(|p| p.name == target.project_name)
            .map(|p| p.id)
            .ok_or_else(|| {
                AppError::PublishValidation(format!("project '{}' not found", target.project_name))
            })
    }

    // TODO: switch to the fileUploads session API for extracts over 64 MB,
    // which Tableau rejects in a single multipart request.
    async fn upload(
        &self,
        target: &PublishTarget,
        session: &Session,
        project_id: &str,
        file: &Path,
        file_type: &str,
        datasource_name: &str,
    ) -> Result<(), AppError> {
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Generic(format!("bad extract path {}", file.display())))?;
        let content = tokio::fs::read(file).await?;

        let boundary = format!("duva-{}", uuid::Uuid::new_v4().simple());
        let payload = datasource_payload(datasource_name, project_id);
        let body = multipart_body(&boundary, &payload, file_name, &content);

        let mut url = self.api_url(
            &target.server_address,
            &format!("sites/{}/datasources", session.site_id),
        )?;
        url.query_pairs_mut()
            .append_pair("overwrite", "true")
            .append_pair("datasourceType", file_type);

        // No total deadline: large uploads are bounded by the idle timeout.
        let resp = self
            .client
            .post(url)
            .header(AUTH_HEADER, &session.token)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/mixed; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        match resp.status() {
            StatusCode::OK | StatusCode::CREATED => {
                tracing::info!(
                    datasource = datasource_name,
                    project = %target.project_name,
                    file_type,
                    "Datasource published"
                );
                Ok(())
            }
            status => {
                let detail = resp.text().await.unwrap_or_default();
                Err(AppError::ClientError(format!(
                    "publish returned {}: {}",
                    status,
                    detail.chars().take(200).collect::<String>()
                )))
            }
        }
    }

    /// Upload `extract`, packaging it first when Tableau cannot take it raw.
    async fn publish_extract(
        &self,
        target: &PublishTarget,
        session: &Session,
        project_id: &str,
        extract: &Path,
        datasource_name: &str,
    ) -> Result<(), AppError> {
        if let Some(file_type) = raw_publish_type(extract) {
            return self
                .upload(target, session, project_id, extract, file_type, datasource_name)
                .await;
        }

        let package = {
            let extract = extract.to_path_buf();
            let name = datasource_name.to_string();
            tokio::task::spawn_blocking(move || package_tdsx(&extract, &name))
                .await
                .map_err(|e| AppError::Generic(format!("packaging task failed: {}", e)))??
        };
        let result = self
            .upload(target, session, project_id, &package, PACKAGE_TYPE, datasource_name)
            .await;
        if let Err(e) = tokio::fs::remove_file(&package).await {
            tracing::debug!(error = %e, path = %package.display(), "Could not remove package");
        }
        result
    }
}

impl PublishClient for TableauClient {
    async fn validate(&self, target: &PublishTarget) -> Result<(), AppError> {
        let session = self.sign_in(target).await.map_err(|e| match e {
            AppError::PublishValidation(_) => e,
            other => AppError::PublishValidation(other.to_string()),
        })?;
        self.sign_out(target, &session)
            .await
            .map_err(|e| AppError::PublishValidation(e.to_string()))
    }

    async fn publish(
        &self,
        target: &PublishTarget,
        extract: &Path,
        datasource_name: &str,
    ) -> Result<(), AppError> {
        let session = self.sign_in(target).await?;

        let result = async {
            let project_id = self.find_project(target, &session).await?;
            self.publish_extract(target, &session, &project_id, extract, datasource_name)
                .await
        }
        .await;

        if let Err(e) = self.sign_out(target, &session).await {
            tracing::warn!(error = %e, "Sign-out after publish failed");
        }
        result
    }
}

// =============================================================================
// Datasource packaging
// =============================================================================

/// `datasourceType` for `path` when Tableau accepts it unpackaged.
pub(crate) fn raw_publish_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    PUBLISHABLE_TYPES.iter().find(|t| **t == ext).copied()
}

/// `.tds` document with a Parquet file connection to `Data/{file_name}`.
pub(crate) fn parquet_tds(datasource_name: &str, file_name: &str) -> String {
    let name = xml_escape(datasource_name);
    let file = xml_escape(file_name);
    let table = xml_escape(
        Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name),
    );
    format!(
        r#"<?xml version='1.0' encoding='utf-8' ?>
<datasource formatted-name='{name}' inline='true' version='18.1'>
  <connection class='federated'>
    <named-connections>
      <named-connection caption='{file}' name='parquet.extract'>
        <connection class='parquet' directory='Data' filename='Data/{file}' />
      </named-connection>
    </named-connections>
    <relation connection='parquet.extract' name='{table}' table='[{table}]' type='table' />
  </connection>
</datasource>
"#
    )
}

/// Write `{extract}.tdsx` beside `extract` and return its path.
pub(crate) fn package_tdsx(extract: &Path, datasource_name: &str) -> Result<PathBuf, AppError> {
    let file_name = extract
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Generic(format!("bad extract path {}", extract.display())))?;
    let package = extract.with_extension(PACKAGE_TYPE);
    let zip_error = |e: zip::result::ZipError| AppError::Generic(format!("tdsx packaging: {}", e));

    let mut zip = ZipWriter::new(std::fs::File::create(&package)?);
    // Parquet pages are already compressed.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);

    zip.start_file(format!("{}.tds", datasource_name), options)
        .map_err(zip_error)?;
    zip.write_all(parquet_tds(datasource_name, file_name).as_bytes())?;

    zip.start_file(format!("Data/{}", file_name), options)
        .map_err(zip_error)?;
    std::io::copy(&mut std::fs::File::open(extract)?, &mut zip)?;

    zip.finish().map_err(zip_error)?;
    Ok(package)
}

// =============================================================================
// Request bodies
// =============================================================================

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn datasource_payload(name: &str, project_id: &str) -> String {
    format!(
        r#"<tsRequest><datasource name="{}"><project id="{}"/></datasource></tsRequest>"#,
        xml_escape(name),
        xml_escape(project_id)
    )
}

/// `multipart/mixed` body with the XML request payload followed by the file.
pub(crate) fn multipart_body(
    boundary: &str,
    payload: &str,
    file_name: &str,
    content: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + payload.len() + 512);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: name=\"request_payload\"\r\n");
    body.extend_from_slice(b"Content-Type: text/xml\r\n\r\n");
    body.extend_from_slice(payload.as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: name=\"tableau_datasource\"; filename=\"{}\"\r\n",
            file_name.replace('"', "_")
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
