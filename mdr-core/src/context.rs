// mdr-core/src/context.rs
use std::sync::Arc;

use mdr_common::cache::Cache;
use mdr_common::config::Config;
use mdr_common::error::{MdrError, Result};
use mdr_common::model::{ResolutionPlatform, ResolutionScope};
use mdr_net::{RepositoryClient, RetryPolicy, Transport};
use tokio_util::sync::CancellationToken;

use crate::cache::FileCache;

/// Everything a resolution run needs, passed down explicitly. Several settings may
/// share one [`FileCache`], which is what de-duplicates their downloads.
#[derive(Debug, Clone)]
pub struct ResolutionSettings {
    pub scope: ResolutionScope,
    /// Never empty; more than one platform selects Kotlin common metadata.
    pub platforms: Vec<ResolutionPlatform>,
    pub download_sources: bool,
    pub max_concurrent_fetches: usize,
    pub cache: Arc<FileCache>,
    pub cancel: CancellationToken,
}

impl ResolutionSettings {
    pub fn new(cache: Arc<FileCache>, scope: ResolutionScope, platforms: Vec<ResolutionPlatform>) -> Self {
        let mut platforms = platforms;
        if platforms.is_empty() {
            platforms.push(ResolutionPlatform::Jvm);
        }
        platforms.sort();
        platforms.dedup();
        let cancel = cache.client().cancellation().clone();
        Self {
            scope,
            platforms,
            download_sources: false,
            max_concurrent_fetches: mdr_common::config::DEFAULT_MAX_CONCURRENT_FETCHES,
            cache,
            cancel,
        }
    }

    /// Applies the download-related parts of `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.download_sources = config.download_sources;
        self.max_concurrent_fetches = config.max_concurrent_fetches.max(1);
        self
    }

    /// Ties this run to `cancel` instead of the cache client's token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_multiplatform(&self) -> bool {
        self.platforms.len() > 1
    }

    pub fn primary_platform(&self) -> ResolutionPlatform {
        self.platforms.first().copied().unwrap_or(ResolutionPlatform::Jvm)
    }

    /// Distinguishes descriptors computed for different scopes and platforms,
    /// e.g. `runtime-iosArm64+jvm`.
    pub fn descriptor_tag(&self) -> String {
        let platforms: Vec<&str> = self.platforms.iter().map(ResolutionPlatform::name).collect();
        let mut tag = format!("{}-{}", self.scope, platforms.join("+"));
        if self.download_sources {
            tag.push_str("-sources");
        }
        tag
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(MdrError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Builds the shared file cache for `config`, reading repositories over HTTP(S) and
/// from local directories.
pub fn build_file_cache(config: &Config, cancel: CancellationToken) -> Result<Arc<FileCache>> {
    let layout = Cache::new(config)?;
    let client = RepositoryClient::from_config(config, cancel)?;
    Ok(Arc::new(FileCache::new(layout, client)))
}

/// Same as [`build_file_cache`] with a caller supplied transport.
pub fn build_file_cache_with(
    config: &Config,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
) -> Result<Arc<FileCache>> {
    let layout = Cache::new(config)?;
    let client = RepositoryClient::new(
        transport,
        config.repositories.clone(),
        RetryPolicy::from_config(config),
        cancel,
    );
    Ok(Arc::new(FileCache::new(layout, client)))
}
