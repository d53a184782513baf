// mdr-common/src/cache.rs
// On-disk layout of the resolution cache: where files, checksum sidecars, parsed
// descriptors and lock files live.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use super::error::{MdrError, Result};
use crate::model::coordinates::{Coordinates, ModuleKey};
use crate::Config;

/// Version listings (`maven-metadata.xml`) change over time; everything else is immutable.
const LISTING_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What kind of file a cache entry holds. Part of the key so a POM and a module file
/// of the same coordinates never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Pom,
    GradleModule,
    VersionListing,
    Artifact,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Pom => f.write_str("pom"),
            FileKind::GradleModule => f.write_str("module"),
            FileKind::VersionListing => f.write_str("maven-metadata"),
            FileKind::Artifact => f.write_str("artifact"),
        }
    }
}

/// Identity of one cached file: coordinates, classifier and extension (folded into the
/// repository path) plus its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: FileKind,
    /// Slash separated path inside a Maven repository.
    pub repository_path: String,
}

impl CacheKey {
    pub fn artifact(coordinates: &Coordinates, classifier: Option<&str>, extension: &str) -> Result<Self> {
        Ok(Self {
            kind: FileKind::Artifact,
            repository_path: coordinates.file_path(classifier, extension)?,
        })
    }

    /// An artifact whose location comes from a `.module` file `url` entry, relative to
    /// the module's version directory.
    pub fn module_file(coordinates: &Coordinates, url: &str) -> Result<Self> {
        let dir = coordinates.file_path(None, "module")?;
        let base = dir.rsplit_once('/').map(|(d, _)| d).unwrap_or_default();
        let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
        for part in url.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(MdrError::ValidationError(format!(
                            "file url '{url}' escapes the repository"
                        )));
                    }
                }
                other => segments.push(other),
            }
        }
        Ok(Self { kind: FileKind::Artifact, repository_path: segments.join("/") })
    }

    pub fn pom(coordinates: &Coordinates) -> Result<Self> {
        Ok(Self { kind: FileKind::Pom, repository_path: coordinates.file_path(None, "pom")? })
    }

    pub fn gradle_module(coordinates: &Coordinates) -> Result<Self> {
        Ok(Self {
            kind: FileKind::GradleModule,
            repository_path: coordinates.file_path(None, "module")?,
        })
    }

    pub fn version_listing(key: &ModuleKey) -> Self {
        Self {
            kind: FileKind::VersionListing,
            repository_path: format!("{}/maven-metadata.xml", key.path()),
        }
    }

    pub fn file_name(&self) -> &str {
        self.repository_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.repository_path)
    }

    /// Flat name usable as a single path component.
    pub fn flat_name(&self) -> String {
        format!("{}-{}", self.kind, self.repository_path.replace('/', "_"))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.repository_path, self.kind)
    }
}

/// Cache struct to manage cache paths
#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
    config: Config,
}

impl Cache {
    /// Create a new Cache using the config's cache root, creating its directories.
    pub fn new(config: &Config) -> Result<Self> {
        for dir in [
            config.artifacts_dir(),
            config.descriptors_dir(),
            config.locks_dir(),
            config.tmp_dir(),
        ] {
            if !dir.exists() {
                fs::create_dir_all(&dir).map_err(|e| {
                    MdrError::Cache(format!("Cannot create {}: {e}", dir.display()))
                })?;
            }
        }
        Ok(Self { root: config.cache_root.clone(), config: config.clone() })
    }

    pub fn get_dir(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn file_path(&self, key: &CacheKey) -> PathBuf {
        let mut path = self.config.artifacts_dir();
        path.extend(key.repository_path.split('/'));
        path
    }

    /// `<file>.sha256`, written after a file has been verified.
    pub fn sidecar_path(&self, key: &CacheKey) -> PathBuf {
        let mut path = self.file_path(key).into_os_string();
        path.push(".sha256");
        PathBuf::from(path)
    }

    pub fn lock_path(&self, lock_name: &str) -> PathBuf {
        self.config.locks_dir().join(format!("{lock_name}.lock"))
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.config.tmp_dir()
    }

    /// `descriptors/<group path>/<module>/<version>/<tag>.json`. The tag separates
    /// descriptors computed for different scopes and platforms.
    pub fn descriptor_path(&self, coordinates: &Coordinates, tag: &str) -> Result<PathBuf> {
        let version = coordinates.version.as_deref().ok_or_else(|| {
            MdrError::Cache(format!("{coordinates} has no version to key a descriptor"))
        })?;
        let mut path = self.config.descriptors_dir();
        path.extend(coordinates.key().path().split('/'));
        path.push(version);
        path.push(format!("{tag}.json"));
        Ok(path)
    }

    /// Version listings are refreshed after a day; other entries never expire.
    pub fn is_listing_fresh(&self, key: &CacheKey) -> Result<bool> {
        let path = self.file_path(key);
        if !path.exists() {
            return Ok(false);
        }
        let modified = fs::metadata(&path)?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .map_err(|e| MdrError::Cache(format!("System time error: {e}")))?;
        Ok(age <= LISTING_TTL)
    }

    /// Removes a cached file together with its checksum sidecar.
    pub fn clear_file(&self, key: &CacheKey) -> Result<()> {
        for path in [self.file_path(key), self.sidecar_path(key)] {
            if path.exists() {
                tracing::debug!("Removing cache entry: {}", path.display());
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Clears all cache files
    pub fn clear_all(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Cache::new(&self.config).map(|_| ())
    }
}
