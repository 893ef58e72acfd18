//! HTTP client for the catalog API.
//!
//! [`RemoteCatalog`] is the seam the filesystem layer depends on: the two
//! read queries needed to browse a project. [`CatalogClient`] implements it
//! over HTTPS with bearer-token authentication.
//!
//! # Status mapping
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx | decoded body |
//! | 401 | [`ApiError::AuthenticationFailed`] |
//! | 404 | [`ApiError::NotFound`] |
//! | any other status above 299 | [`ApiError::Status`] |
//! | connection/TLS/timeout failure | [`ApiError::Transport`] |

use crate::entry::RemoteEntry;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read queries against a project's catalog.
///
/// Implementations must be safe to call concurrently; the filesystem issues
/// queries from several kernel worker threads at once.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Lists the children of the directory at `path`, in catalog order.
    async fn list_directory(&self, path: &str) -> ApiResult<Vec<RemoteEntry>>;

    /// Resolves the single entry at `path`.
    async fn entry_by_path(&self, path: &str) -> ApiResult<RemoteEntry>;
}

/// Connection parameters for [`CatalogClient`].
#[derive(Debug)]
pub struct ClientConfig {
    /// API root, e.g. `https://materialscommons.org/api`.
    pub base_url: Url,
    /// Bearer token. Never logged.
    pub token: SecretString,
    /// Project whose tree is exposed.
    pub project_id: u64,
    /// Upper bound for a single request, including connect.
    pub request_timeout: Duration,
    /// Skip TLS certificate verification (self-signed test servers).
    pub accept_invalid_certs: bool,
}

impl ClientConfig {
    /// Creates a configuration with default timeout and TLS verification on.
    pub fn new(base_url: &str, token: impl Into<String>, project_id: u64) -> ApiResult<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            token: SecretString::from(token.into()),
            project_id,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            accept_invalid_certs: false,
        })
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

#[derive(Debug, Serialize)]
struct EntryByPathRequest<'a> {
    path: &'a str,
    project_id: u64,
}

#[derive(Debug, Serialize)]
struct CreateDirectoryRequest<'a> {
    name: &'a str,
    directory_id: u64,
    project_id: u64,
}

/// HTTP implementation of [`RemoteCatalog`].
pub struct CatalogClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl CatalogClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("mcfs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn project_id(&self) -> u64 {
        self.config.project_id
    }

    /// Creates a directory named `name` under the directory with id
    /// `parent_directory_id`.
    ///
    /// The mount never calls this; it is exposed for tooling built on the
    /// client.
    pub async fn create_directory(&self, name: &str, parent_directory_id: u64) -> ApiResult<RemoteEntry> {
        let url = self.endpoint("directories")?;
        let body = CreateDirectoryRequest {
            name,
            directory_id: parent_directory_id,
            project_id: self.config.project_id,
        };
        debug!(name, parent_directory_id, "create_directory");
        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let bytes = checked_body(response, name).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Joins `route` onto the configured base URL.
    fn endpoint(&self, route: &str) -> ApiResult<Url> {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{route}"))?)
    }
}

#[async_trait]
impl RemoteCatalog for CatalogClient {
    async fn list_directory(&self, path: &str) -> ApiResult<Vec<RemoteEntry>> {
        let url = self.endpoint(&format!(
            "projects/{}/directories_by_path",
            self.config.project_id
        ))?;
        let start = Instant::now();
        let response = self
            .http
            .get(url)
            .query(&[("path", path)])
            .bearer_auth(self.config.token.expose_secret())
            .send()
            .await?;
        let bytes = checked_body(response, path).await?;
        let entries: Vec<RemoteEntry> = serde_json::from_slice(&bytes)?;
        debug!(
            path,
            count = entries.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "list_directory"
        );
        Ok(entries)
    }

    async fn entry_by_path(&self, path: &str) -> ApiResult<RemoteEntry> {
        let url = self.endpoint("files/by_path")?;
        let body = EntryByPathRequest {
            path,
            project_id: self.config.project_id,
        };
        let start = Instant::now();
        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        let bytes = checked_body(response, path).await?;
        let entry: RemoteEntry = serde_json::from_slice(&bytes)?;
        debug!(path, elapsed_ms = start.elapsed().as_millis(), "entry_by_path");
        Ok(entry)
    }
}

/// Maps an HTTP status to the catalog error taxonomy.
pub fn classify_status(status: StatusCode, path: &str) -> ApiResult<()> {
    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::AuthenticationFailed),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound {
            path: path.to_string(),
        }),
        s if s.as_u16() > 299 => Err(ApiError::Status { status: s.as_u16() }),
        _ => Ok(()),
    }
}

async fn checked_body(response: Response, path: &str) -> ApiResult<Vec<u8>> {
    let status = response.status();
    trace!(path, status = status.as_u16(), "catalog response");
    classify_status(status, path)?;
    Ok(response.bytes().await?.to_vec())
}
