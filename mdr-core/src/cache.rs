// mdr-core/src/cache.rs
//! File cache in front of the repository client.
//!
//! Every file goes through [`FileCache::get_or_fetch`], which keeps at most one fetch per
//! [`CacheKey`] in flight inside the process. Across processes a lock file in
//! `<cache_root>/locks` serialises writers. A cached file is only served when its
//! recomputed sha256 matches the sidecar written after verification.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use mdr_aio::{
    atomic_write_file_async, compute_hashes_async, hash_bytes, read_if_exists_async,
    verify_checksum_async, StagedFile,
};
use mdr_common::cache::{Cache, CacheKey, FileKind};
use mdr_common::dependency::Message;
use mdr_common::error::{MdrError, Result};
use mdr_common::model::{HashAlgorithm, Hashes, Repository, ResolvedFile};
use mdr_net::RepositoryClient;
use tracing::{debug, warn};

use crate::lock::FileLock;

const UNVERIFIED_MARKER: &str = "unverified";

/// What to fetch and what it is expected to look like.
#[derive(Debug, Clone)]
pub struct FileRequest {
    pub key: CacheKey,
    /// Digests published in metadata. Empty when the metadata carries none.
    pub expected: Hashes,
    pub declared_size: Option<u64>,
}

impl FileRequest {
    pub fn new(key: CacheKey) -> Self {
        Self { key, expected: Hashes::default(), declared_size: None }
    }

    pub fn with_expectations(mut self, expected: Hashes, declared_size: Option<u64>) -> Self {
        self.expected = expected;
        self.declared_size = declared_size;
        self
    }
}

/// A file present in the cache.
#[derive(Debug, Clone)]
pub struct CachedFile {
    pub file: ResolvedFile,
    /// Repository that served the file; `None` when it came from the cache.
    pub repository: Option<Repository>,
    pub warnings: Vec<Message>,
}

impl CachedFile {
    pub fn sha256(&self) -> &str {
        self.file.hashes.sha256.as_deref().unwrap_or_default()
    }
}

type FetchResult = Result<Option<CachedFile>>;
type Fetch = Shared<BoxFuture<'static, FetchResult>>;
/// Weak so that a fetch every caller walked away from is dropped, lock included.
type InFlight = WeakShared<BoxFuture<'static, FetchResult>>;

pub struct FileCache {
    layout: Cache,
    client: RepositoryClient,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
}

impl std::fmt::Debug for FileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCache")
            .field("root", &self.layout.get_dir())
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl FileCache {
    pub fn new(layout: Cache, client: RepositoryClient) -> Self {
        Self { layout, client, in_flight: Mutex::new(HashMap::new()) }
    }

    pub fn layout(&self) -> &Cache {
        &self.layout
    }

    pub fn client(&self) -> &RepositoryClient {
        &self.client
    }

    /// Runs `fetcher` unless a fetch of `key` is already in flight, in which case the
    /// caller awaits that one. The map lock is held only around lookup and insert.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetcher: F) -> FetchResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| MdrError::Cache("in-flight table is poisoned".to_string()))?;
            match in_flight.get(key).and_then(WeakShared::upgrade) {
                Some(existing) => {
                    debug!("Joining in-flight fetch of {}", key);
                    existing
                }
                None => {
                    let fresh: Fetch = fetcher().boxed().shared();
                    if let Some(weak) = fresh.downgrade() {
                        in_flight.insert(key.clone(), weak);
                    }
                    fresh
                }
            }
        };

        let result = shared.clone().await;

        if let Ok(mut in_flight) = self.in_flight.lock() {
            let finished = in_flight
                .get(key)
                .is_some_and(|current| current.upgrade().is_none_or(|c| c.ptr_eq(&shared)));
            if finished {
                in_flight.remove(key);
            }
        }
        result
    }

    /// Returns the cached file for `request`, downloading and verifying it when the
    /// cache has no valid copy. `Ok(None)` means no repository has the file.
    pub async fn fetch(self: &Arc<Self>, request: FileRequest) -> FetchResult {
        let this = Arc::clone(self);
        let key = request.key.clone();
        self.get_or_fetch(&key, move || async move { this.load(request).await })
            .await
    }

    async fn load(&self, request: FileRequest) -> FetchResult {
        if let Some(hit) = self.warm_hit(&request).await? {
            return Ok(Some(hit));
        }

        let lock_path = self.layout.lock_path(&lock_name(&request.key));
        let _lock = FileLock::acquire(&lock_path, self.client.cancellation()).await?;
        // Another process may have finished the download while we waited.
        if let Some(hit) = self.warm_hit(&request).await? {
            return Ok(Some(hit));
        }

        match self.download(&request).await {
            Err(e) if request.key.kind == FileKind::VersionListing && !matches!(e, MdrError::Cancelled) => {
                match self.stale_listing(&request).await? {
                    Some(stale) => {
                        warn!("Using stale {} after refresh failed: {}", request.key, e);
                        Ok(Some(stale))
                    }
                    None => Err(e),
                }
            }
            other => other,
        }
    }

    /// A verified copy already in the cache. Corrupted copies are removed.
    async fn warm_hit(&self, request: &FileRequest) -> FetchResult {
        let key = &request.key;
        let path = self.layout.file_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        if key.kind == FileKind::VersionListing && !self.layout.is_listing_fresh(key)? {
            debug!("{} is older than its time to live", key);
            return Ok(None);
        }
        let Some(record) = self.read_sidecar(key).await? else {
            debug!("{} has no checksum sidecar, fetching again", key);
            return Ok(None);
        };

        let actual = compute_hashes_async(&path, &[HashAlgorithm::Sha256]).await?;
        let actual = actual.sha256.unwrap_or_default();
        let size_ok = match request.declared_size {
            Some(size) => tokio::fs::metadata(&path).await?.len() == size,
            None => true,
        };
        let expected_ok = request
            .expected
            .sha256
            .as_deref()
            .is_none_or(|e| e.eq_ignore_ascii_case(&actual));
        if actual != record.sha256 || !size_ok || !expected_ok {
            warn!("Cached {} is corrupted, fetching it again", path.display());
            self.layout.clear_file(key)?;
            return Ok(None);
        }

        debug!("Using cached {}", path.display());
        let warnings = if record.verified {
            Vec::new()
        } else {
            no_checksum_warning(key)
        };
        Ok(Some(CachedFile {
            file: resolved_file(path, &request.expected, actual, request.declared_size),
            repository: None,
            warnings,
        }))
    }

    async fn stale_listing(&self, request: &FileRequest) -> FetchResult {
        let path = self.layout.file_path(&request.key);
        let Some(record) = self.read_sidecar(&request.key).await? else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(CachedFile {
            file: resolved_file(path, &request.expected, record.sha256, None),
            repository: None,
            warnings: Vec::new(),
        }))
    }

    async fn download(&self, request: &FileRequest) -> FetchResult {
        let key = &request.key;
        let Some((repository, bytes)) = self.client.fetch_first(&key.repository_path).await? else {
            debug!("{} is not in any repository", key);
            return Ok(None);
        };

        if let Some(size) = request.declared_size {
            if bytes.len() as u64 != size {
                return Err(MdrError::ChecksumMismatch(format!(
                    "{} from {} is {} bytes, metadata declares {}",
                    key.file_name(),
                    repository,
                    bytes.len(),
                    size
                )));
            }
        }

        let expected = match request.expected.strongest() {
            Some((algorithm, value)) => Some((algorithm, value.to_string())),
            None => {
                self.client
                    .fetch_strongest_checksum(&repository, &key.repository_path)
                    .await?
            }
        };

        let mut staged = StagedFile::new_in(&self.layout.tmp_dir(), key.file_name())?;
        staged.write_chunk(&bytes).await?;
        staged.flush().await?;
        match &expected {
            Some((algorithm, value)) => {
                verify_checksum_async(staged.path(), *algorithm, value).await?;
                debug!("Verified {} of {}", algorithm, key);
            }
            None => debug!("No checksum published for {}", key),
        }

        let sha256 = hash_bytes(HashAlgorithm::Sha256, &bytes);
        let destination = self.layout.file_path(key);
        let path = staged.commit(&destination).await?;
        let record = SidecarRecord { sha256: sha256.clone(), verified: expected.is_some() };
        atomic_write_file_async(&self.layout.sidecar_path(key), record.render().as_bytes()).await?;
        debug!("Cached {} from {}", path.display(), repository);

        let warnings = if record.verified {
            Vec::new()
        } else {
            no_checksum_warning(key)
        };
        Ok(Some(CachedFile {
            file: resolved_file(path, &request.expected, sha256, request.declared_size),
            repository: Some(repository),
            warnings,
        }))
    }

    async fn read_sidecar(&self, key: &CacheKey) -> Result<Option<SidecarRecord>> {
        let Some(bytes) = read_if_exists_async(&self.layout.sidecar_path(key)).await? else {
            return Ok(None);
        };
        Ok(SidecarRecord::parse(&String::from_utf8_lossy(&bytes)))
    }
}

/// Content of `<file>.sha256`: the digest, then `unverified` when the file was
/// accepted without a published checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SidecarRecord {
    sha256: String,
    verified: bool,
}

impl SidecarRecord {
    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let sha256 = HashAlgorithm::Sha256.normalize_checksum_file(lines.next()?)?;
        let verified = lines.next() != Some(UNVERIFIED_MARKER);
        Some(Self { sha256, verified })
    }

    fn render(&self) -> String {
        if self.verified {
            format!("{}\n", self.sha256)
        } else {
            format!("{}\n{}\n", self.sha256, UNVERIFIED_MARKER)
        }
    }
}

fn resolved_file(
    path: std::path::PathBuf,
    expected: &Hashes,
    sha256: String,
    declared_size: Option<u64>,
) -> ResolvedFile {
    let mut hashes = expected.clone();
    hashes.sha256 = Some(sha256);
    ResolvedFile { path, hashes, declared_size }
}

/// Only artifacts are reported; descriptors without checksums are common in local
/// repositories and are logged instead.
fn no_checksum_warning(key: &CacheKey) -> Vec<Message> {
    if key.kind == FileKind::Artifact {
        vec![Message::warning(
            "NoChecksum",
            format!("No checksum available for {}", key.file_name()),
        )]
    } else {
        Vec::new()
    }
}

fn lock_name(key: &CacheKey) -> String {
    let digest = hash_bytes(HashAlgorithm::Sha256, key.flat_name().as_bytes());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use mdr_common::model::Coordinates;
    use mdr_common::Config;
    use mdr_net::RetryPolicy;
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn setup(repo_dir: &std::path::Path, cache_dir: &std::path::Path) -> Arc<FileCache> {
        let mut config = Config::with_cache_root(cache_dir);
        config.repositories = vec![Repository::Local(repo_dir.to_path_buf())];
        let layout = Cache::new(&config).unwrap();
        let client = RepositoryClient::new(
            Arc::new(mdr_net::HttpTransport::new(&config).unwrap()),
            config.repositories.clone(),
            RetryPolicy::none(),
            CancellationToken::new(),
        );
        Arc::new(FileCache::new(layout, client))
    }

    fn publish(repo_dir: &std::path::Path, relative: &str, content: &[u8], with_sha1: bool) {
        let path = repo_dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        if with_sha1 {
            let digest = hash_bytes(HashAlgorithm::Sha1, content);
            std::fs::write(format!("{}.sha1", path.display()), digest).unwrap();
        }
    }

    fn jar_key() -> CacheKey {
        CacheKey::artifact(&Coordinates::parse("org.acme:widget:1.0").unwrap(), None, "jar").unwrap()
    }

    #[tokio::test]
    async fn downloads_verifies_and_reuses() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        publish(repo.path(), "org/acme/widget/1.0/widget-1.0.jar", b"jar bytes", true);
        let cache = setup(repo.path(), cache_dir.path());

        let cold = cache.fetch(FileRequest::new(jar_key())).await.unwrap().unwrap();
        assert!(cold.repository.is_some());
        assert!(cold.warnings.is_empty());
        assert_eq!(std::fs::read(&cold.file.path).unwrap(), b"jar bytes");

        // The repository copy disappears; the cache must still serve the file.
        std::fs::remove_dir_all(repo.path().join("org")).unwrap();
        let warm = cache.fetch(FileRequest::new(jar_key())).await.unwrap().unwrap();
        assert!(warm.repository.is_none());
        assert_eq!(warm.file, cold.file);
    }

    #[tokio::test]
    async fn corrupted_entries_are_fetched_again() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        publish(repo.path(), "org/acme/widget/1.0/widget-1.0.jar", b"jar bytes", true);
        let cache = setup(repo.path(), cache_dir.path());

        let first = cache.fetch(FileRequest::new(jar_key())).await.unwrap().unwrap();
        std::fs::write(&first.file.path, b"tampered").unwrap();
        let second = cache.fetch(FileRequest::new(jar_key())).await.unwrap().unwrap();
        assert!(second.repository.is_some());
        assert_eq!(std::fs::read(&second.file.path).unwrap(), b"jar bytes");
    }

    #[tokio::test]
    async fn checksum_mismatch_discards_the_download() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        publish(repo.path(), "org/acme/widget/1.0/widget-1.0.jar", b"jar bytes", false);
        std::fs::write(
            repo.path().join("org/acme/widget/1.0/widget-1.0.jar.sha1"),
            "0000000000000000000000000000000000000000",
        )
        .unwrap();
        let cache = setup(repo.path(), cache_dir.path());

        let err = cache.fetch(FileRequest::new(jar_key())).await.unwrap_err();
        assert_eq!(err.kind(), "ChecksumMismatch");
        assert!(!cache.layout().file_path(&jar_key()).exists());
        assert_eq!(std::fs::read_dir(cache.layout().tmp_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_checksum_is_a_warning_on_every_use() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        publish(repo.path(), "org/acme/widget/1.0/widget-1.0.jar", b"jar bytes", false);
        let cache = setup(repo.path(), cache_dir.path());

        let cold = cache.fetch(FileRequest::new(jar_key())).await.unwrap().unwrap();
        let warm = cache.fetch(FileRequest::new(jar_key())).await.unwrap().unwrap();
        for fetched in [cold, warm] {
            assert_eq!(fetched.warnings.len(), 1);
            assert!(fetched.warnings[0].text.starts_with("No checksum available"));
        }
    }

    #[tokio::test]
    async fn declared_size_is_enforced() {
        let repo = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        publish(repo.path(), "org/acme/widget/1.0/widget-1.0.jar", b"jar bytes", true);
        let cache = setup(repo.path(), cache_dir.path());

        let request = FileRequest::new(jar_key()).with_expectations(Hashes::default(), Some(3));
        assert_eq!(cache.fetch(request).await.unwrap_err().kind(), "ChecksumMismatch");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let cache_dir = tempfile::tempdir().unwrap();
        let repo = tempfile::tempdir().unwrap();
        let cache = setup(repo.path(), cache_dir.path());
        let runs = Arc::new(AtomicUsize::new(0));

        let key = jar_key();
        let callers = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            let runs = Arc::clone(&runs);
            let key = key.clone();
            async move {
                cache
                    .get_or_fetch(&key, move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(None)
                    })
                    .await
            }
        });
        let results = futures::future::join_all(callers).await;
        assert!(results.iter().all(|r| matches!(r, Ok(None))));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sidecar_records_verification_state() {
        let digest = "a".repeat(64);
        let verified = SidecarRecord { sha256: digest.clone(), verified: true };
        assert_eq!(SidecarRecord::parse(&verified.render()), Some(verified));
        let unverified = SidecarRecord { sha256: digest, verified: false };
        assert_eq!(SidecarRecord::parse(&unverified.render()), Some(unverified));
        assert_eq!(SidecarRecord::parse("not hex"), None);
    }
}
