// mdr-aio/src/json_io.rs
use std::path::Path;

use mdr_common::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Pretty-prints `data` and replaces `path` with it in one rename.
pub async fn write_json_async<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(data)?;
    debug!("Storing {} bytes of JSON at {}", bytes.len(), path.display());
    crate::fs::atomic_write_file_async(path, &bytes).await
}

pub async fn read_json_async<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = crate::fs::read_to_bytes_async(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
