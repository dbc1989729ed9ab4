//! Newline-delimited JSON log helpers shared by the stores.

use std::io;
use std::path::Path;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::StoreError;

/// Run a blocking file operation off the async runtime
async fn blocking<T, F>(op: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
}

/// Append one record under an exclusive file lock and sync it to disk
pub async fn append_locked<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let line = format!("{}\n", serde_json::to_string(record)?);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    // The duplicate shares the open file description, so its lock covers `file`
    let guard = file.try_clone().await?.into_std().await;
    let guard = blocking(move || guard.lock_exclusive().map(|()| guard)).await?;

    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await?;

    // Lock is released once both handles are dropped
    drop(guard);
    Ok(())
}

/// Read every record in order; a missing file is an empty log
pub async fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(Vec::new());
    }

    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut records = Vec::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }

    Ok(records)
}
