// mdr-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use tracing::debug;

use super::error::{MdrError, Result};
use crate::model::repository::Repository;

pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";
const DEFAULT_CACHE_DIR_NAME: &str = ".mdr";
const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 200;
const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 5;
const USER_AGENT_STRING: &str = concat!("mdr/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct Config {
    pub cache_root: PathBuf,
    /// Consulted in order; the first repository serving a file wins.
    pub repositories: Vec<Repository>,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub download_sources: bool,
    pub user_agent: String,
}

impl Config {
    /// Builds a configuration rooted at `cache_root` with default settings and no
    /// environment overrides. Tests use this to get isolated instances.
    pub fn with_cache_root(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            repositories: vec![Repository::Remote(MAVEN_CENTRAL.to_string())],
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_secs(DEFAULT_RETRY_MAX_DELAY_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            download_sources: false,
            user_agent: USER_AGENT_STRING.to_string(),
        }
    }

    pub fn load() -> Result<Self> {
        debug!("Loading mdr configuration");

        let cache_root = match env::var("MDR_CACHE_DIR").ok().filter(|s| !s.is_empty()) {
            Some(dir) => {
                debug!("MDR_CACHE_DIR override: {}", dir);
                PathBuf::from(dir)
            }
            None => default_cache_root()?,
        };
        let mut config = Self::with_cache_root(cache_root);

        if let Some(list) = env::var("MDR_REPOSITORIES").ok().filter(|s| !s.is_empty()) {
            debug!("MDR_REPOSITORIES override: {}", list);
            config.repositories = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Repository::parse)
                .collect::<Result<Vec<_>>>()?;
        }
        if let Ok(value) = env::var("MDR_MAX_RETRIES") {
            config.max_retries = value.parse().map_err(|_| {
                MdrError::Config(format!("MDR_MAX_RETRIES is not a number: '{value}'"))
            })?;
            debug!("MDR_MAX_RETRIES override: {}", config.max_retries);
        }
        if let Ok(value) = env::var("MDR_MAX_CONCURRENT_FETCHES") {
            config.max_concurrent_fetches = value
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    MdrError::Config(format!(
                        "MDR_MAX_CONCURRENT_FETCHES must be a positive number: '{value}'"
                    ))
                })?;
            debug!(
                "MDR_MAX_CONCURRENT_FETCHES override: {}",
                config.max_concurrent_fetches
            );
        }
        if let Ok(value) = env::var("MDR_REQUEST_TIMEOUT") {
            config.request_timeout = humantime::parse_duration(&value).map_err(|e| {
                MdrError::Config(format!("MDR_REQUEST_TIMEOUT '{value}' is invalid: {e}"))
            })?;
            debug!(
                "MDR_REQUEST_TIMEOUT override: {}",
                humantime::format_duration(config.request_timeout)
            );
        }
        if env::var("MDR_DOWNLOAD_SOURCES").is_ok_and(|v| v == "1" || v == "true") {
            config.download_sources = true;
        }

        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.cache_root.join("artifacts")
    }

    pub fn descriptors_dir(&self) -> PathBuf {
        self.cache_root.join("descriptors")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.cache_root.join("locks")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.cache_root.join("tmp")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.cache_root.join("logs")
    }
}

fn default_cache_root() -> Result<PathBuf> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_CACHE_DIR_NAME))
        .ok_or_else(|| MdrError::Config("Could not determine the home directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_maven_central() {
        let config = Config::with_cache_root("/tmp/mdr-test");
        assert_eq!(
            config.repositories,
            vec![Repository::Remote(MAVEN_CENTRAL.to_string())]
        );
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_concurrent_fetches, 10);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.locks_dir(), PathBuf::from("/tmp/mdr-test/locks"));
    }
}
