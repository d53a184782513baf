// mdr-net/src/transport.rs
use async_trait::async_trait;
use mdr_common::error::Result;
use mdr_common::model::Repository;

/// Result of a single read from a repository. A missing file is an expected
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(Vec<u8>),
    NotFound,
}

impl FetchOutcome {
    pub fn into_option(self) -> Option<Vec<u8>> {
        match self {
            FetchOutcome::Found(bytes) => Some(bytes),
            FetchOutcome::NotFound => None,
        }
    }
}

/// Reads files out of Maven-layout repositories.
///
/// One call is one attempt; retries and repository fallback are layered on top
/// by [`crate::RepositoryClient`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Reads `path` (slash separated, relative to the repository root).
    async fn get(&self, repository: &Repository, path: &str) -> Result<FetchOutcome>;
}
