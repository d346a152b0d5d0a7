//! Tick export sources.
//!
//! A [`TickSource`] turns a [`UserRef`] into that user's parsed ticks. The
//! HTTP source downloads the export from the climbing database; the
//! directory source reads previously saved exports from disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use url::Url;

use crate::config::{SourceConfig, SourceKind};
use crate::ingest::{parse_tick_export, ParseError};
use crate::models::{is_valid_username, Tick, UserRef};

/// Errors that can occur while fetching a user's ticks.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid tick export: {0}")]
    Parse(#[from] ParseError),
}

/// Anything that can produce a user's ticks.
#[async_trait]
pub trait TickSource: Send + Sync {
    /// Source name for logging.
    fn name(&self) -> &'static str;

    /// Fetch and parse all of a user's ticks, most recent first.
    async fn fetch_ticks(&self, user: &UserRef) -> Result<Vec<Tick>, FetchError>;
}

/// Downloads tick exports over HTTP.
pub struct HttpTickSource {
    client: Client,
    base_url: Url,
}

impl HttpTickSource {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("tick-tracker/0.1.0")),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// `{base_url}/user/{id}/{username}/tick-export`
    pub fn export_url(&self, user: &UserRef) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["user", user.user_id.as_str(), user.username.as_str(), "tick-export"]);
        Ok(url)
    }
}

#[async_trait]
impl TickSource for HttpTickSource {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_ticks(&self, user: &UserRef) -> Result<Vec<Tick>, FetchError> {
        let url = self.export_url(user)?;
        info!("Fetching ticks for {} from {}", user.username, url);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.text().await?;
        debug!("Received {} bytes for {}", body.len(), user.username);

        Ok(parse_tick_export(&body)?)
    }
}

/// Reads `<username>.csv` exports from a directory.
pub struct DirectoryTickSource {
    directory: PathBuf,
}

impl DirectoryTickSource {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    /// `{directory}/{username}.csv`. Usernames with path syntax are refused.
    pub fn export_path(&self, user: &UserRef) -> Result<PathBuf, FetchError> {
        if !is_valid_username(&user.username) {
            return Err(FetchError::InvalidUsername(user.username.clone()));
        }
        Ok(self.directory.join(format!("{}.csv", user.username)))
    }
}

#[async_trait]
impl TickSource for DirectoryTickSource {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn fetch_ticks(&self, user: &UserRef) -> Result<Vec<Tick>, FetchError> {
        let path = self.export_path(user)?;
        debug!("Reading ticks for {} from {:?}", user.username, path);

        let content = fs::read_to_string(&path).await?;
        Ok(parse_tick_export(&content)?)
    }
}

/// Create the tick source described by `config`.
pub fn create_source(config: &SourceConfig) -> Result<Arc<dyn TickSource>, FetchError> {
    match config.kind {
        SourceKind::Http => Ok(Arc::new(HttpTickSource::new(config)?)),
        SourceKind::Directory => Ok(Arc::new(DirectoryTickSource::new(config.directory.clone()))),
    }
}

/// In-memory source for tests. Unknown users answer 404.
#[cfg(test)]
#[derive(Default)]
pub struct StaticTickSource {
    responses: std::collections::HashMap<String, Vec<Tick>>,
    exports: std::collections::HashMap<String, String>,
    delay: Option<std::time::Duration>,
}

#[cfg(test)]
impl StaticTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, ticks: Vec<Tick>) -> Self {
        self.responses.insert(username.to_string(), ticks);
        self
    }

    /// Answer with raw export text, parsed on every fetch.
    pub fn with_export(mut self, username: &str, content: &str) -> Self {
        self.exports.insert(username.to_string(), content.to_string());
        self
    }

    /// Wait this long before answering each fetch.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl TickSource for StaticTickSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_ticks(&self, user: &UserRef) -> Result<Vec<Tick>, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(content) = self.exports.get(&user.username) {
            return Ok(parse_tick_export(content)?);
        }
        self.responses
            .get(&user.username)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                status: 404,
                message: "Not Found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{render_tick_export, EXPECTED_HEADER};
    use tempfile::TempDir;

    #[test]
    fn test_export_url() {
        let source = HttpTickSource::new(&SourceConfig::default()).unwrap();
        let url = source
            .export_url(&UserRef::new("110713768", "crag-cat"))
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://www.mountainproject.com/user/110713768/crag-cat/tick-export"
        );
    }

    #[test]
    fn test_export_url_with_trailing_slash_base() {
        let config = SourceConfig {
            base_url: "http://localhost:8080/mp/".to_string(),
            ..SourceConfig::default()
        };
        let source = HttpTickSource::new(&config).unwrap();
        let url = source.export_url(&UserRef::new("1", "a b")).unwrap();

        assert_eq!(url.as_str(), "http://localhost:8080/mp/user/1/a%20b/tick-export");
    }

    #[test]
    fn test_invalid_base_url() {
        let config = SourceConfig {
            base_url: "not a url".to_string(),
            ..SourceConfig::default()
        };
        assert!(matches!(
            HttpTickSource::new(&config),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_source_reads_export() {
        let temp_dir = TempDir::new().unwrap();
        let ticks = vec![Tick::new("2024-06-01", "Test Route").with_rating("5.11a")];
        std::fs::write(
            temp_dir.path().join("alex.csv"),
            render_tick_export(&ticks),
        )
        .unwrap();

        let source = DirectoryTickSource::new(temp_dir.path().to_path_buf());
        let fetched = source
            .fetch_ticks(&UserRef::new("1", "alex"))
            .await
            .unwrap();

        assert_eq!(fetched, ticks);
    }

    #[tokio::test]
    async fn test_directory_source_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = DirectoryTickSource::new(temp_dir.path().to_path_buf());

        let result = source.fetch_ticks(&UserRef::new("1", "nobody")).await;
        assert!(matches!(result, Err(FetchError::Io(_))));
    }

    #[tokio::test]
    async fn test_directory_source_refuses_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let inner = temp_dir.path().join("exports");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(temp_dir.path().join("x.csv"), format!("{}\n", EXPECTED_HEADER)).unwrap();

        let source = DirectoryTickSource::new(inner);
        let result = source.fetch_ticks(&UserRef::new("1", "../x")).await;
        assert!(matches!(result, Err(FetchError::InvalidUsername(_))));
    }

    #[tokio::test]
    async fn test_directory_source_rejects_html() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("private.csv"),
            "<!DOCTYPE html><html><body>Log in</body></html>",
        )
        .unwrap();

        let source = DirectoryTickSource::new(temp_dir.path().to_path_buf());
        let result = source.fetch_ticks(&UserRef::new("1", "private")).await;
        assert!(matches!(
            result,
            Err(FetchError::Parse(ParseError::MarkupDocument))
        ));
    }

    #[tokio::test]
    async fn test_directory_source_header_only_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("new.csv"), format!("{}\n", EXPECTED_HEADER)).unwrap();

        let source = DirectoryTickSource::new(temp_dir.path().to_path_buf());
        let ticks = source.fetch_ticks(&UserRef::new("1", "new")).await.unwrap();
        assert!(ticks.is_empty());
    }

    #[test]
    fn test_create_source_kinds() {
        let http = create_source(&SourceConfig::default()).unwrap();
        assert_eq!(http.name(), "http");

        let directory = create_source(&SourceConfig {
            kind: SourceKind::Directory,
            ..SourceConfig::default()
        })
        .unwrap();
        assert_eq!(directory.name(), "directory");
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticTickSource::new().with_user("a", vec![Tick::new("2024-06-01", "X")]);

        assert_eq!(source.fetch_ticks(&UserRef::new("1", "a")).await.unwrap().len(), 1);
        assert!(source.fetch_ticks(&UserRef::new("2", "b")).await.is_err());
    }
}
