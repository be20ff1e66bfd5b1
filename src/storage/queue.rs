//! Durable job queue.
//!
//! Jobs are delivered at most once across processes: the file backend claims
//! a job by renaming it out of the queue directory, the `SQLite` backend by a
//! single `DELETE ... RETURNING`. Ordering is by enqueue time; `priority` is
//! stored but not used for ordering.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, warn};
use uuid::Uuid;

use super::core::SqliteStore;
use super::fs::write_atomic;
use crate::error::StorageError;
use crate::providers::Provider;

/// A job to be enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    /// CI provider the run belongs to.
    pub provider: Provider,
    /// Run identifier.
    pub run_id: String,
    /// Inline logs; fetched from the provider when absent.
    pub logs: Option<String>,
    /// Scheduling hint.
    pub priority: i32,
}

impl NewJob {
    /// A job without inline logs and default priority.
    #[must_use]
    pub fn new(provider: Provider, run_id: impl Into<String>) -> Self {
        Self {
            provider,
            run_id: run_id.into(),
            logs: None,
            priority: 0,
        }
    }

    /// Attach inline logs.
    #[must_use]
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = Some(logs.into());
        self
    }

    /// Set the priority hint.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// A persisted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique id.
    pub id: Uuid,
    /// CI provider the run belongs to.
    pub provider: Provider,
    /// Run identifier.
    pub run_id: String,
    /// Inline logs, if any.
    pub logs: Option<String>,
    /// Scheduling hint.
    pub priority: i32,
    /// When the job was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    fn from_new(job: NewJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: job.provider,
            run_id: job.run_id,
            logs: job.logs,
            priority: job.priority,
            enqueued_at: Utc::now(),
        }
    }
}

/// Durable FIFO of heal jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Persist a job and return it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the job cannot be persisted.
    async fn enqueue(&self, job: NewJob) -> Result<Job, StorageError>;

    /// Remove and return the oldest job, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read.
    async fn try_dequeue(&self) -> Result<Option<Job>, StorageError>;

    /// Number of jobs waiting.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read.
    async fn pending(&self) -> Result<usize, StorageError>;

    /// Like [`JobQueue::try_dequeue`], polling every `poll` for up to `wait`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read.
    async fn dequeue(&self, wait: Duration, poll: Duration) -> Result<Option<Job>, StorageError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(job) = self.try_dequeue().await? {
                return Ok(Some(job));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

const CLAIMED_DIR: &str = "claimed";
const DEAD_DIR: &str = "dead";

/// One JSON file per job, named so that lexical order is enqueue order.
#[derive(Debug, Clone)]
pub struct FileQueue {
    dir: PathBuf,
}

impl FileQueue {
    /// Queue rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Queue directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn queued_files(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, &e)),
        };
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, &e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.')
                && name.ends_with(".json")
                && entry.file_type().await.is_ok_and(|t| t.is_file())
            {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn quarantine(&self, claimed: &Path, name: &str) {
        let dead = self.dir.join(DEAD_DIR);
        if tokio::fs::create_dir_all(&dead).await.is_ok() {
            let _ = tokio::fs::rename(claimed, dead.join(name)).await;
        }
    }
}

#[async_trait]
impl JobQueue for FileQueue {
    async fn enqueue(&self, job: NewJob) -> Result<Job, StorageError> {
        let job = Job::from_new(job);
        let nanos = job.enqueued_at.timestamp_nanos_opt().unwrap_or_default();
        let name = format!("{nanos:020}-{}.json", job.id.simple());
        write_atomic(&self.dir.join(name), &serde_json::to_string(&job)?).await?;
        debug!(job_id = %job.id, run_id = %job.run_id, "Job enqueued");
        Ok(job)
    }

    async fn try_dequeue(&self) -> Result<Option<Job>, StorageError> {
        let claimed_dir = self.dir.join(CLAIMED_DIR);
        for path in self.queued_files().await? {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            tokio::fs::create_dir_all(&claimed_dir)
                .await
                .map_err(|e| StorageError::io(&claimed_dir, &e))?;
            let claimed = claimed_dir.join(&name);
            match tokio::fs::rename(&path, &claimed).await {
                Ok(()) => {}
                // another worker won the race
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&path, &e)),
            }

            let raw = tokio::fs::read_to_string(&claimed)
                .await
                .map_err(|e| StorageError::io(&claimed, &e))?;
            match serde_json::from_str::<Job>(&raw) {
                Ok(job) => {
                    let _ = tokio::fs::remove_file(&claimed).await;
                    return Ok(Some(job));
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Malformed job moved aside");
                    self.quarantine(&claimed, &name).await;
                }
            }
        }
        Ok(None)
    }

    async fn pending(&self) -> Result<usize, StorageError> {
        Ok(self.queued_files().await?.len())
    }
}

/// `SQLite`-backed queue, shareable by many worker processes.
#[derive(Debug, Clone)]
pub struct SqliteQueue {
    store: SqliteStore,
}

impl SqliteQueue {
    /// Queue over `store`.
    #[must_use]
    pub const fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    fn row_to_job(row: &SqliteRow) -> Result<Job, StorageError> {
        let get_err = |e: sqlx::Error| SqliteStore::query_error("decode_job", &e);
        let id: String = row.try_get("id").map_err(get_err)?;
        let provider: String = row.try_get("provider").map_err(get_err)?;
        let enqueued_at: String = row.try_get("enqueued_at").map_err(get_err)?;
        Ok(Job {
            id: Uuid::parse_str(&id).map_err(|e| StorageError::Serialization {
                message: format!("invalid job id '{id}': {e}"),
            })?,
            provider: provider.parse().map_err(|e| StorageError::Serialization {
                message: format!("{e}"),
            })?,
            run_id: row.try_get("run_id").map_err(get_err)?,
            logs: row.try_get("logs").map_err(get_err)?,
            priority: row.try_get("priority").map_err(get_err)?,
            enqueued_at: enqueued_at
                .parse()
                .map_err(|e| StorageError::Serialization {
                    message: format!("invalid enqueued_at '{enqueued_at}': {e}"),
                })?,
        })
    }
}

#[async_trait]
impl JobQueue for SqliteQueue {
    async fn enqueue(&self, job: NewJob) -> Result<Job, StorageError> {
        let job = Job::from_new(job);
        sqlx::query(
            "INSERT INTO jobs (id, provider, run_id, logs, priority, enqueued_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(job.provider.as_str())
        .bind(&job.run_id)
        .bind(&job.logs)
        .bind(job.priority)
        .bind(job.enqueued_at.to_rfc3339())
        .execute(&self.store.pool)
        .await
        .map_err(|e| SqliteStore::query_error("enqueue_job", &e))?;
        debug!(job_id = %job.id, run_id = %job.run_id, "Job enqueued");
        Ok(job)
    }

    async fn try_dequeue(&self) -> Result<Option<Job>, StorageError> {
        let row = sqlx::query(
            "DELETE FROM jobs WHERE seq = (SELECT seq FROM jobs ORDER BY seq LIMIT 1) \
             RETURNING id, provider, run_id, logs, priority, enqueued_at",
        )
        .fetch_optional(&self.store.pool)
        .await
        .map_err(|e| SqliteStore::query_error("dequeue_job", &e))?;
        row.as_ref().map(Self::row_to_job).transpose()
    }

    async fn pending(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.store.pool)
            .await
            .map_err(|e| SqliteStore::query_error("count_jobs", &e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn exercise_fifo(queue: &dyn JobQueue) {
        let a = queue
            .enqueue(NewJob::new(Provider::Github, "101").with_priority(5))
            .await
            .unwrap();
        let b = queue
            .enqueue(NewJob::new(Provider::Local, "102").with_logs("boom"))
            .await
            .unwrap();
        assert_eq!(queue.pending().await.unwrap(), 2);

        let first = queue.try_dequeue().await.unwrap().unwrap();
        let second = queue.try_dequeue().await.unwrap().unwrap();
        assert_eq!(first.id, a.id);
        assert_eq!(first.priority, 5);
        assert_eq!(second.id, b.id);
        assert_eq!(second.logs.as_deref(), Some("boom"));
        assert!(queue.try_dequeue().await.unwrap().is_none());
        assert_eq!(queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_queue_fifo() {
        let dir = TempDir::new().unwrap();
        exercise_fifo(&FileQueue::new(dir.path().join("queue"))).await;
    }

    #[tokio::test]
    async fn test_sqlite_queue_fifo() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        exercise_fifo(&SqliteQueue::new(store)).await;
    }

    #[tokio::test]
    async fn test_file_queue_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let queue = FileQueue::new(dir.path().join("absent"));
        assert_eq!(queue.pending().await.unwrap(), 0);
        assert!(queue.try_dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_queue_skips_malformed_job() {
        let dir = TempDir::new().unwrap();
        let queue = FileQueue::new(dir.path());
        std::fs::write(dir.path().join("00000000000000000001-bad.json"), "{nope").unwrap();
        let good = queue.enqueue(NewJob::new(Provider::Local, "7")).await.unwrap();

        let job = queue.try_dequeue().await.unwrap().unwrap();
        assert_eq!(job.id, good.id);
        assert!(dir.path().join(DEAD_DIR).join("00000000000000000001-bad.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dequeue_waits_then_gives_up() {
        let dir = TempDir::new().unwrap();
        let queue = FileQueue::new(dir.path());
        let start = tokio::time::Instant::now();
        let job = queue
            .dequeue(Duration::from_millis(500), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(job.is_none());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_concurrent_consumers_get_each_job_once() {
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(FileQueue::new(dir.path()));
        for i in 0..20 {
            queue
                .enqueue(NewJob::new(Provider::Local, i.to_string()))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let q = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(job) = q.try_dequeue().await.unwrap() {
                    got.push(job.id);
                }
                got
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.await.unwrap() {
                assert!(seen.insert(id), "job delivered twice");
            }
        }
        assert_eq!(seen.len(), 20);
    }
}
