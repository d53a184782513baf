/*
File: mdr-aio/src/fs.rs
Purpose: Filesystem primitives used by the cache: staged writes that only become
visible through an atomic rename.
*/
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdr_common::error::{MdrError, Result};
use tempfile::{Builder, NamedTempFile};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

/// Creates a directory and all its parent components if they are missing.
pub fn create_dir_all(path: &Path) -> Result<()> {
    debug!("Creating directory recursively: {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        error!("Failed create dir {}: {}", path.display(), e);
        MdrError::from(e)
    })
}

/// Removes a file, treating a missing file as success.
pub async fn remove_file_if_exists_async(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed file: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            error!("Failed remove file {}: {}", path.display(), e);
            Err(MdrError::from(e))
        }
    }
}

/// Reads the entire contents of a file into a byte vector.
pub async fn read_to_bytes_async(path: &Path) -> Result<Vec<u8>> {
    debug!("Async reading file to bytes: {}", path.display());
    tokio::fs::read(path).await.map_err(MdrError::from)
}

/// Reads a file if it exists.
pub async fn read_if_exists_async(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MdrError::from(e)),
    }
}

/// Atomically writes data to a file using a temporary file in the same directory.
pub fn atomic_write_file(original_path: &Path, content: &[u8]) -> Result<()> {
    let dir = original_path.parent().ok_or_else(|| {
        MdrError::Cache(format!(
            "Cannot get parent directory for {}",
            original_path.display()
        ))
    })?;
    create_dir_all(dir)?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    let temp_path = temp_file.path().to_path_buf();
    debug!(
        "Atomically writing {} bytes to {} via temp file {}",
        content.len(),
        original_path.display(),
        temp_path.display()
    );
    temp_file.write_all(content)?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(original_path).map_err(|e| {
        error!(
            "Failed to persist temporary file {} over {}: {}",
            temp_path.display(),
            original_path.display(),
            e.error
        );
        MdrError::Io(Arc::new(e.error))
    })?;
    Ok(())
}

pub async fn atomic_write_file_async(original_path: &Path, content: &[u8]) -> Result<()> {
    let path = original_path.to_path_buf();
    let content = content.to_vec();
    tokio::task::spawn_blocking(move || atomic_write_file(&path, &content))
        .await
        .map_err(|e| MdrError::Generic(format!("write task failed: {e}")))?
}

/// A file being written in a staging directory. Dropping it without calling
/// [`StagedFile::commit`] deletes the partial file.
pub struct StagedFile {
    temp: NamedTempFile,
    writer: tokio::fs::File,
    written: u64,
}

impl StagedFile {
    /// Creates `~<name_hint>XXXX` inside `dir`.
    pub fn new_in(dir: &Path, name_hint: &str) -> Result<Self> {
        create_dir_all(dir)?;
        let temp = Builder::new()
            .prefix(&format!("~{name_hint}"))
            .tempfile_in(dir)?;
        let writer = tokio::fs::File::from_std(temp.reopen()?);
        debug!("Staging download in {}", temp.path().display());
        Ok(Self { temp, writer, written: 0 })
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.writer.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Flushes the staged content so it can be hashed from disk.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.sync_all().await?;
        Ok(())
    }

    /// Moves the staged file to `destination`, replacing whatever was there.
    pub async fn commit(mut self, destination: &Path) -> Result<PathBuf> {
        self.flush().await?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let destination = destination.to_path_buf();
        let temp = self.temp;
        drop(self.writer);
        tokio::task::spawn_blocking(move || {
            temp.persist(&destination)
                .map(|_| destination.clone())
                .map_err(|e| {
                    error!("Failed to move staged file to {}: {}", destination.display(), e.error);
                    MdrError::Io(Arc::new(e.error))
                })
        })
        .await
        .map_err(|e| MdrError::Generic(format!("commit task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_file_only_appears_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out").join("widget.jar");
        let mut staged = StagedFile::new_in(&dir.path().join("tmp"), "widget.jar").unwrap();
        staged.write_chunk(b"hello ").await.unwrap();
        staged.write_chunk(b"world").await.unwrap();
        assert_eq!(staged.bytes_written(), 11);
        assert!(!target.exists());
        staged.commit(&target).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn dropped_staged_file_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("tmp");
        {
            let mut staged = StagedFile::new_in(&tmp, "partial.jar").unwrap();
            staged.write_chunk(b"half").await.unwrap();
        }
        assert_eq!(std::fs::read_dir(&tmp).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.json");
        atomic_write_file_async(&path, b"one").await.unwrap();
        atomic_write_file_async(&path, b"two").await.unwrap();
        assert_eq!(read_to_bytes_async(&path).await.unwrap(), b"two");
        assert_eq!(read_if_exists_async(&dir.path().join("nope")).await.unwrap(), None);
    }
}
