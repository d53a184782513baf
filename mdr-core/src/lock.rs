// mdr-core/src/lock.rs
// Cross-process exclusion for cache writes: an exclusive kernel lock on a file under
// `<cache_root>/locks`. The kernel drops the lock when its holder exits, so a crashed
// process never blocks others. Lock files stay in place after release.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use mdr_common::error::{MdrError, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const INITIAL_POLL: Duration = Duration::from_millis(20);
const MAX_POLL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Waits for the exclusive lock on `path`, polling with backoff until it is free
    /// or `cancel` fires.
    pub async fn acquire(path: &Path, cancel: &CancellationToken) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = open_lock_file(path)?;
        let mut delay = INITIAL_POLL;
        loop {
            if cancel.is_cancelled() {
                return Err(MdrError::Cancelled);
            }
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired lock {}", path.display());
                    return Ok(Self { file, path: path.to_path_buf() });
                }
                Err(e) if is_contended(&e) => {
                    debug!("Waiting {:?} for lock {}", delay, path.display());
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(MdrError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = (delay * 2).min(MAX_POLL);
                }
                Err(e) => return Err(MdrError::from(e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(MdrError::from)
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
