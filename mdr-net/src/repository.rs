// mdr-net/src/repository.rs
use std::fmt;
use std::sync::Arc;

use mdr_common::config::Config;
use mdr_common::error::{MdrError, Result};
use mdr_common::model::{HashAlgorithm, Repository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http::HttpTransport;
use crate::retry::RetryPolicy;
use crate::transport::{FetchOutcome, Transport};

/// Reads repository files and their published checksums from an ordered list of
/// repositories. Which file to ask for (`.module` before `.pom`, listings, sources)
/// is decided by the caller. Each read is retried on transient failures; a file missing
/// from one repository is looked up in the next.
#[derive(Clone)]
pub struct RepositoryClient {
    transport: Arc<dyn Transport>,
    repositories: Vec<Repository>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl fmt::Debug for RepositoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryClient")
            .field("repositories", &self.repositories)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RepositoryClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        repositories: Vec<Repository>,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self { transport, repositories, retry, cancel }
    }

    /// Client over HTTP(S) and local directories for the configured repositories.
    pub fn from_config(config: &Config, cancel: CancellationToken) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(
            Arc::new(transport),
            config.repositories.clone(),
            RetryPolicy::from_config(config),
            cancel,
        ))
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Reads `path` from one repository, retrying transient failures.
    pub async fn fetch_from(&self, repository: &Repository, path: &str) -> Result<FetchOutcome> {
        let what = repository.location(path);
        self.retry
            .run(&what, &self.cancel, || self.transport.get(repository, path))
            .await
    }

    /// Reads `path` from the first repository that has it.
    ///
    /// `Ok(None)` means every repository answered "not found". When nothing was
    /// found and at least one repository failed, the last failure is returned.
    pub async fn fetch_first(&self, path: &str) -> Result<Option<(Repository, Vec<u8>)>> {
        let mut last_error: Option<MdrError> = None;
        for repository in &self.repositories {
            if self.cancel.is_cancelled() {
                return Err(MdrError::Cancelled);
            }
            debug!("Looking for {} in {}", path, repository);
            match self.fetch_from(repository, path).await {
                Ok(FetchOutcome::Found(bytes)) => {
                    debug!("Found {} in {} ({} bytes)", path, repository, bytes.len());
                    return Ok(Some((repository.clone(), bytes)));
                }
                Ok(FetchOutcome::NotFound) => {}
                Err(MdrError::Cancelled) => return Err(MdrError::Cancelled),
                Err(e) => {
                    warn!("Fetching {} from {} failed: {}", path, repository, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// The published checksum of `file_path` for `algorithm`, normalized to lowercase
    /// hex. Unparseable checksum files count as absent.
    pub async fn fetch_checksum(
        &self,
        repository: &Repository,
        file_path: &str,
        algorithm: HashAlgorithm,
    ) -> Result<Option<String>> {
        let path = format!("{}.{}", file_path, algorithm.extension());
        let Some(bytes) = self.fetch_from(repository, &path).await?.into_option() else {
            return Ok(None);
        };
        let content = String::from_utf8_lossy(&bytes);
        match algorithm.normalize_checksum_file(&content) {
            Some(value) => Ok(Some(value)),
            None => {
                warn!("Ignoring malformed checksum file {}", repository.location(&path));
                Ok(None)
            }
        }
    }

    /// The strongest checksum `repository` publishes for `file_path`.
    pub async fn fetch_strongest_checksum(
        &self,
        repository: &Repository,
        file_path: &str,
    ) -> Result<Option<(HashAlgorithm, String)>> {
        for algorithm in HashAlgorithm::ALL {
            if let Some(value) = self.fetch_checksum(repository, file_path, algorithm).await? {
                return Ok(Some((algorithm, value)));
            }
        }
        Ok(None)
    }
}
