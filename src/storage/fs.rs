//! Filesystem helpers shared by the file-backed stores and ledgers.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(10);

fn lock_exclusive(path: &Path, file: &File) -> Result<(), StorageError> {
    let start = Instant::now();
    loop {
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                if start.elapsed() >= LOCK_TIMEOUT {
                    return Err(StorageError::Io {
                        path: path.display().to_string(),
                        message: format!(
                            "timed out waiting for file lock ({}s)",
                            LOCK_TIMEOUT.as_secs()
                        ),
                    });
                }
                std::thread::sleep(LOCK_RETRY);
            }
            Err(e) => return Err(StorageError::io(path, &e)),
        }
    }
}

/// Append `record` as one JSON line under an exclusive lock, then
/// `sync_data`. Blocking.
///
/// # Errors
///
/// Returns [`StorageError`] if the line is not written and synced.
pub fn append_json_line<T: Serialize>(path: &Path, record: &T) -> Result<(), StorageError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, &e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::io(path, &e))?;

    lock_exclusive(path, &file)?;
    let written = file
        .write_all(line.as_bytes())
        .and_then(|()| file.sync_data());
    let _ = FileExt::unlock(&file);
    written.map_err(|e| StorageError::io(path, &e))
}

/// Every line of a JSON-lines file that parses as `T`, in file order.
/// A missing file is empty; malformed lines are skipped.
///
/// # Errors
///
/// Returns [`StorageError`] if the file exists but cannot be read.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(path, &e)),
    };
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| StorageError::io(path, &e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => debug!(path = %path.display(), line = idx + 1, error = %e, "Skipping malformed line"),
        }
    }
    Ok(records)
}

/// Sibling temp path, hidden and unique, so directory scans skip it.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "file".into(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

/// Write `content` to `path` so readers see either the old or the new file.
///
/// The data is written to a temp sibling, synced, given the target's existing
/// permissions, then renamed over the target.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if any step fails; the temp file is removed.
pub async fn write_atomic(path: &Path, content: &str) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, &e))?;
    }

    let tmp = temp_sibling(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        if let Ok(meta) = tokio::fs::metadata(path).await {
            tokio::fs::set_permissions(&tmp, meta.permissions()).await?;
        }
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StorageError::io(path, &e));
    }
    Ok(())
}
