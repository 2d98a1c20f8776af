#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Mergin Maps client for fetching the survey project.
//!
//! Only the read path of the Mergin Maps API is used: log in, read the
//! project's file list, and download every file of the latest version
//! into a local directory. The local directory is removed first, so a
//! download always leaves a complete, fresh snapshot (or nothing).

pub mod progress;
pub mod retry;

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt as _;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt as _;

pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Public Mergin Maps server.
pub const DEFAULT_MERGIN_URL: &str = "https://app.merginmaps.com";

/// Environment variable holding the Mergin login.
pub const LOGIN_ENV: &str = "MERGIN_LOGIN";
/// Environment variable holding the Mergin password.
pub const PASSWORD_ENV: &str = "MERGIN_PASSWORD";

/// Errors that can occur while talking to Mergin Maps.
#[derive(Debug, thiserror::Error)]
pub enum MerginError {
    /// A credential environment variable is unset or empty.
    #[error("missing credential: set {0}")]
    MissingCredential(&'static str),

    /// The project path is not `namespace/name`.
    #[error("invalid project path '{0}', expected 'namespace/name'")]
    InvalidProject(String),

    /// The server URL cannot be used as a base URL.
    #[error("invalid server URL '{0}'")]
    InvalidUrl(String),

    /// The login response carried no session token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("HTTP {status} for {url}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request URL without its query string.
        url: String,
        /// Start of the response body.
        message: String,
    },

    /// A response body did not match the expected JSON shape.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A project file path would escape the download directory.
    #[error("refusing to write project file outside the target directory: {0}")]
    UnsafePath(String),

    /// Local file system failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Mergin login and password. Both are opaque and never logged; the
/// [`fmt::Debug`] output redacts them.
#[derive(Clone)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    #[must_use]
    pub const fn new(login: String, password: String) -> Self {
        Self { login, password }
    }

    /// Reads [`LOGIN_ENV`] and [`PASSWORD_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`MerginError::MissingCredential`] naming the first
    /// variable that is unset or empty.
    pub fn from_env() -> Result<Self, MerginError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.is_empty())
                .ok_or(MerginError::MissingCredential(name))
        };

        Ok(Self::new(read(LOGIN_ENV)?, read(PASSWORD_ENV)?))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A project reference of the form `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectPath {
    pub namespace: String,
    pub name: String,
}

impl std::str::FromStr for ProjectPath {
    type Err = MerginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name))
                if !namespace.trim().is_empty() && !name.trim().is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(MerginError::InvalidProject(s.to_string())),
        }
    }
}

impl TryFrom<String> for ProjectPath {
    type Error = MerginError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProjectPath> for String {
    fn from(value: ProjectPath) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One file of a project version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectFile {
    /// Path relative to the project root.
    pub path: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// Project metadata returned by `GET /v1/project/{namespace}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub namespace: String,
    /// Latest version tag (e.g. `"v12"`).
    pub version: String,
    #[serde(default)]
    pub files: Vec<ProjectFile>,
}

impl ProjectInfo {
    /// Sum of all file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Summary of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Version that was downloaded.
    pub version: String,
    /// Number of files written.
    pub files: usize,
    /// Total bytes written.
    pub bytes: u64,
}

#[derive(Deserialize)]
struct LoginResponse {
    session: Option<SessionToken>,
}

#[derive(Deserialize)]
struct SessionToken {
    token: String,
}

/// Something that can replace a local directory with a fresh copy of a
/// remote project.
#[async_trait::async_trait]
pub trait ProjectDownloader: Send + Sync {
    /// Removes `dest` if present, then downloads `project` into it.
    ///
    /// # Errors
    ///
    /// Returns [`MerginError`] on any authentication, network or file
    /// system failure.
    async fn download_project(
        &self,
        project: &ProjectPath,
        dest: &Path,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<DownloadSummary, MerginError>;
}

/// Client for one Mergin Maps server.
pub struct MerginClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
    credentials: Credentials,
}

impl MerginClient {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`MerginError::InvalidUrl`] if `base_url` is not an
    /// absolute `http(s)` URL, or [`MerginError::Http`] if the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, credentials: Credentials) -> Result<Self, MerginError> {
        let base_url = reqwest::Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| MerginError::InvalidUrl(base_url.to_string()))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("ecosystem-map/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(300))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    /// Logs in and returns the session token.
    ///
    /// # Errors
    ///
    /// Returns [`MerginError::Auth`] if the response has no token, or any
    /// HTTP error from the request.
    pub async fn login(&self) -> Result<String, MerginError> {
        let url = self.endpoint(&["v1", "auth", "login"])?;
        let body = serde_json::json!({
            "login": self.credentials.login,
            "password": self.credentials.password,
        });

        log::info!("Authenticating with {}", self.base_url);
        let response: LoginResponse =
            retry::send_json(|| self.client.post(url.clone()).json(&body)).await?;

        response
            .session
            .map(|session| session.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| MerginError::Auth("no session token in login response".to_string()))
    }

    /// Fetches project metadata for the latest version.
    ///
    /// # Errors
    ///
    /// Returns any HTTP or JSON error from the request.
    pub async fn project_info(
        &self,
        token: &str,
        project: &ProjectPath,
    ) -> Result<ProjectInfo, MerginError> {
        let url = self.endpoint(&["v1", "project", &project.namespace, &project.name])?;
        retry::send_json(|| self.client.get(url.clone()).bearer_auth(token)).await
    }

    async fn download_file(
        &self,
        token: &str,
        project: &ProjectPath,
        version: &str,
        file: &ProjectFile,
        dest: &Path,
        progress: &dyn ProgressCallback,
    ) -> Result<u64, MerginError> {
        let url = self.endpoint(&["v1", "project", "raw", &project.namespace, &project.name])?;
        let query = [("file", file.path.as_str()), ("version", version)];

        let response = retry::send(|| {
            self.client
                .get(url.clone())
                .query(&query)
                .bearer_auth(token)
        })
        .await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let mut out = tokio::fs::File::create(dest)
            .await
            .map_err(|e| io_error(dest, e))?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await.map_err(|e| io_error(dest, e))?;
            written += chunk.len() as u64;
            progress.inc(chunk.len() as u64);
        }

        out.flush().await.map_err(|e| io_error(dest, e))?;

        Ok(written)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, MerginError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| MerginError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ProjectDownloader for MerginClient {
    async fn download_project(
        &self,
        project: &ProjectPath,
        dest: &Path,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<DownloadSummary, MerginError> {
        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            log::info!("Removing existing directory: {}", dest.display());
            tokio::fs::remove_dir_all(dest)
                .await
                .map_err(|e| io_error(dest, e))?;
        }

        let token = self.login().await?;
        let info = self.project_info(&token, project).await?;

        log::info!(
            "Downloading {project} {} ({} files, {} bytes) to {}",
            info.version,
            info.files.len(),
            info.total_size(),
            dest.display()
        );

        let targets = info
            .files
            .iter()
            .map(|file| safe_join(dest, &file.path).map(|path| (file, path)))
            .collect::<Result<Vec<_>, _>>()?;

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| io_error(dest, e))?;

        progress.set_total(info.total_size());

        let mut bytes = 0;
        for (file, path) in &targets {
            progress.set_message(file.path.clone());
            bytes += self
                .download_file(&token, project, &info.version, file, path, progress.as_ref())
                .await?;
            log::debug!("  wrote {}", path.display());
        }

        progress.finish(format!("Downloaded {project} {}", info.version));
        log::info!("Download complete: {} files, {bytes} bytes", targets.len());

        Ok(DownloadSummary {
            version: info.version,
            files: targets.len(),
            bytes,
        })
    }
}

/// Joins a server-supplied relative path onto `root`, rejecting absolute
/// paths and parent-directory components.
///
/// # Errors
///
/// Returns [`MerginError::UnsafePath`] if `relative` could resolve outside
/// `root`.
pub fn safe_join(root: &Path, relative: &str) -> Result<PathBuf, MerginError> {
    let path = Path::new(relative);
    let mut joined = root.to_path_buf();
    let mut depth = 0_usize;

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MerginError::UnsafePath(relative.to_string()));
            }
        }
    }

    if depth == 0 {
        return Err(MerginError::UnsafePath(relative.to_string()));
    }

    Ok(joined)
}

fn io_error(path: &Path, source: std::io::Error) -> MerginError {
    MerginError::Io {
        path: path.display().to_string(),
        source,
    }
}
