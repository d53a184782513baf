use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MdrError, Result};

/// A Maven-layout repository, either served over HTTP(S) or read from a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Repository {
    Remote(String),
    Local(PathBuf),
}

impl Repository {
    /// Accepts `http(s)://` URLs, `file://` URLs and plain filesystem paths.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw)
                .map_err(|e| MdrError::Config(format!("Invalid repository URL '{raw}': {e}")))?;
            return Ok(Repository::Remote(url.as_str().trim_end_matches('/').to_string()));
        }
        if raw.starts_with("file:") {
            let url = Url::parse(raw)
                .map_err(|e| MdrError::Config(format!("Invalid repository URL '{raw}': {e}")))?;
            let path = url.to_file_path().map_err(|_| {
                MdrError::Config(format!("Repository URL '{raw}' is not a local path"))
            })?;
            return Ok(Repository::Local(path));
        }
        if raw.contains("://") {
            return Err(MdrError::Config(format!(
                "Unsupported repository scheme in '{raw}'"
            )));
        }
        Ok(Repository::Local(PathBuf::from(raw)))
    }

    /// The user's Maven local repository (`~/.m2/repository`), when a home directory exists.
    pub fn maven_local() -> Option<Self> {
        directories::BaseDirs::new()
            .map(|dirs| Repository::Local(dirs.home_dir().join(".m2").join("repository")))
    }

    /// Location of `relative_path` (slash separated) inside this repository.
    pub fn location(&self, relative_path: &str) -> String {
        match self {
            Repository::Remote(url) => format!("{}/{}", url.trim_end_matches('/'), relative_path),
            Repository::Local(root) => root.join(relative_path).display().to_string(),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repository::Remote(url) => write!(f, "{url}"),
            Repository::Local(path) => write!(f, "{}", path.display()),
        }
    }
}
