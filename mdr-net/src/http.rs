// mdr-net/src/http.rs
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mdr_common::config::Config;
use mdr_common::error::{MdrError, Result};
use mdr_common::model::Repository;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, error};

use crate::transport::{FetchOutcome, Transport};
use crate::validation::{looks_like_html_page, validate_relative_path, validate_repository_url};

pub fn build_http_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(&config.user_agent)
        .map_err(|e| MdrError::Config(format!("Invalid user agent '{}': {e}", config.user_agent)))?;
    headers.insert(USER_AGENT, agent);
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| MdrError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Serves remote repositories over HTTP(S) and local repositories from disk.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        for repository in &config.repositories {
            if let Repository::Remote(url) = repository {
                validate_repository_url(url)?;
            }
        }
        Ok(Self { client: build_http_client(config)? })
    }

    async fn get_remote(&self, base: &str, path: &str) -> Result<FetchOutcome> {
        let url = format!("{}/{}", base.trim_end_matches('/'), path);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            debug!("HTTP request failed for {url}: {e}");
            MdrError::from(e)
        })?;
        let status = response.status();
        debug!("Received HTTP status: {} for {}", status, url);

        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            error!("HTTP error {} for URL {}", status, url);
            return Err(MdrError::DownloadError(file_name_of(path), url, format!("HTTP {status}")));
        }

        let content = response.bytes().await.map_err(MdrError::from)?;
        if looks_like_html_page(&content) {
            debug!("{} answered with an HTML page, treating as missing", url);
            return Ok(FetchOutcome::NotFound);
        }
        Ok(FetchOutcome::Found(content.to_vec()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, repository: &Repository, path: &str) -> Result<FetchOutcome> {
        validate_relative_path(path)?;
        match repository {
            Repository::Remote(base) => self.get_remote(base, path).await,
            Repository::Local(root) => read_local(root, path).await,
        }
    }
}

async fn read_local(root: &Path, path: &str) -> Result<FetchOutcome> {
    let mut full: PathBuf = root.to_path_buf();
    full.extend(path.split('/'));
    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), full.display());
            Ok(FetchOutcome::Found(bytes))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FetchOutcome::NotFound),
        Err(e) => Err(MdrError::from(e)),
    }
}

fn file_name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_repositories_are_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("org/acme/a/1.0/a-1.0.pom");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"<project/>").unwrap();

        let config = Config::with_cache_root(dir.path().join("cache"));
        let transport = HttpTransport::new(&config).unwrap();
        let repo = Repository::Local(dir.path().to_path_buf());

        let found = transport.get(&repo, "org/acme/a/1.0/a-1.0.pom").await.unwrap();
        assert_eq!(found, FetchOutcome::Found(b"<project/>".to_vec()));
        let missing = transport.get(&repo, "org/acme/a/2.0/a-2.0.pom").await.unwrap();
        assert_eq!(missing, FetchOutcome::NotFound);
        assert!(transport.get(&repo, "../outside").await.is_err());
    }

    #[test]
    fn client_builds_from_defaults() {
        let config = Config::with_cache_root("/tmp/mdr-http-test");
        assert!(build_http_client(&config).is_ok());
    }
}
