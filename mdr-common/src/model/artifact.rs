// mdr-common/src/model/artifact.rs
// Files produced by resolution and the checksums attached to them.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Checksum algorithms Maven repositories publish, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha512,
    Sha256,
    Sha1,
    Md5,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha1,
        HashAlgorithm::Md5,
    ];

    /// Extension of the checksum file next to an artifact (`widget-1.0.jar.sha1`).
    pub fn extension(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Length of the hex encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Md5 => 32,
        }
    }

    /// Normalises the content of a checksum file: the first whitespace separated
    /// token, lower-cased, left-padded with zeros (some publishers drop leading zeros).
    pub fn normalize_checksum_file(&self, content: &str) -> Option<String> {
        let token = content.split_whitespace().next()?.to_ascii_lowercase();
        if token.is_empty() || token.len() > self.hex_len() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(format!("{:0>width$}", token, width = self.hex_len()))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Known digests of a file. Every field is optional; absence means "not published".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl Hashes {
    pub fn get(&self, algorithm: HashAlgorithm) -> Option<&str> {
        match algorithm {
            HashAlgorithm::Sha512 => self.sha512.as_deref(),
            HashAlgorithm::Sha256 => self.sha256.as_deref(),
            HashAlgorithm::Sha1 => self.sha1.as_deref(),
            HashAlgorithm::Md5 => self.md5.as_deref(),
        }
    }

    pub fn set(&mut self, algorithm: HashAlgorithm, value: String) {
        let slot = match algorithm {
            HashAlgorithm::Sha512 => &mut self.sha512,
            HashAlgorithm::Sha256 => &mut self.sha256,
            HashAlgorithm::Sha1 => &mut self.sha1,
            HashAlgorithm::Md5 => &mut self.md5,
        };
        *slot = Some(value);
    }

    /// Strongest available digest.
    pub fn strongest(&self) -> Option<(HashAlgorithm, &str)> {
        HashAlgorithm::ALL
            .iter()
            .find_map(|a| self.get(*a).map(|v| (*a, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.strongest().is_none()
    }
}

/// A file placed in the cache. The declared size is the one published in metadata and
/// stays `None` when the publisher omitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFile {
    pub path: PathBuf,
    pub hashes: Hashes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_size: Option<u64>,
}
