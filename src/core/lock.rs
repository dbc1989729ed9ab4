//! Single-worker guard for a store directory.
//!
//! The task log outlives any one process, but only one worker may drive
//! it: reconciliation treats every `processing` record as abandoned, which
//! is only true when no other worker is alive. [`WorkerLock`] holds an
//! exclusive `fs2` lock on `<home>/worker.lock` for as long as it lives.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::StoreError;

/// Exclusive claim on a store directory; released on drop
#[derive(Debug)]
pub struct WorkerLock {
    path: PathBuf,
    file: File,
}

impl WorkerLock {
    /// Claim `path` without waiting; fails with `StoreError::Locked` if
    /// another worker (in this or any process) holds it
    pub async fn acquire(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let target = path.clone();
        let claimed = tokio::task::spawn_blocking(move || -> io::Result<Option<File>> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&target)?;
            match file.try_lock_exclusive() {
                Ok(()) => Ok(Some(file)),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        match claimed {
            Some(file) => {
                debug!(path = %path.display(), "Worker lock acquired");
                Ok(Self { path, file })
            }
            None => Err(StoreError::Locked(path)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
