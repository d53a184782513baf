// mdr-aio/src/checksum.rs
use std::path::Path;

use md5::Md5;
use mdr_common::error::{MdrError, Result};
use mdr_common::model::{HashAlgorithm, Hashes};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

enum Hasher {
    Sha512(Sha512),
    Sha256(Sha256),
    Sha1(Sha1),
    Md5(Md5),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha512(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        match self {
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hex digest of an in-memory buffer.
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finish()
}

/// Streams a file once and computes every requested digest.
pub async fn compute_hashes_async(path: &Path, algorithms: &[HashAlgorithm]) -> Result<Hashes> {
    let mut file = File::open(path).await?;
    let mut hashers: Vec<(HashAlgorithm, Hasher)> =
        algorithms.iter().map(|a| (*a, Hasher::new(*a))).collect();
    let mut buffer = Vec::with_capacity(64 * 1024);
    let mut total_bytes_read = 0u64;

    loop {
        buffer.clear();
        let n = file.read_buf(&mut buffer).await?;
        if n == 0 {
            break;
        }
        for (_, hasher) in hashers.iter_mut() {
            hasher.update(&buffer[..n]);
        }
        total_bytes_read += n as u64;
    }

    let mut hashes = Hashes::default();
    for (algorithm, hasher) in hashers {
        hashes.set(algorithm, hasher.finish());
    }
    debug!(
        "Hashed {} ({} bytes read, {} digests)",
        path.display(),
        total_bytes_read,
        algorithms.len()
    );
    Ok(hashes)
}

/// Verifies a file against an expected digest of the given algorithm.
pub async fn verify_checksum_async(path: &Path, algorithm: HashAlgorithm, expected: &str) -> Result<()> {
    debug!("Async verifying {} checksum for: {}", algorithm, path.display());
    let hashes = compute_hashes_async(path, &[algorithm]).await?;
    let actual = hashes.get(algorithm).unwrap_or_default();
    debug!("Expected {}: {}", algorithm, expected);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(MdrError::ChecksumMismatch(format!(
            "Hashes don't match for {} of {}: expected {}, got {}",
            algorithm,
            path.display(),
            expected,
            actual
        )))
    }
}
