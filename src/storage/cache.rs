//! Content-addressed analysis cache.
//!
//! Keyed by [`LogFingerprint`]; byte-identical logs get the same diagnosis
//! without another model call.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::debug;

use super::core::SqliteStore;
use super::fingerprint::LogFingerprint;
use super::fs::write_atomic;
use crate::error::StorageError;
use crate::traits::Diagnosis;

/// Fingerprint → diagnosis store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Look up a cached diagnosis.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be read.
    async fn get(&self, key: &LogFingerprint) -> Result<Option<Diagnosis>, StorageError>;

    /// Store a diagnosis.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the store cannot be written.
    async fn put(&self, key: &LogFingerprint, diagnosis: &Diagnosis) -> Result<(), StorageError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    fingerprint: String,
    cached_at: DateTime<Utc>,
    diagnosis: Diagnosis,
}

/// One JSON file per fingerprint.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, key: &LogFingerprint) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ContentCache for FileCache {
    async fn get(&self, key: &LogFingerprint) -> Result<Option<Diagnosis>, StorageError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&path, &e)),
        };
        let record: CacheRecord = serde_json::from_str(&raw)?;
        Ok(Some(record.diagnosis))
    }

    async fn put(&self, key: &LogFingerprint, diagnosis: &Diagnosis) -> Result<(), StorageError> {
        let record = CacheRecord {
            fingerprint: key.to_string(),
            cached_at: Utc::now(),
            diagnosis: diagnosis.clone(),
        };
        let body = serde_json::to_string_pretty(&record)?;
        write_atomic(&self.entry_path(key), &body).await?;
        debug!(fingerprint = key.short(), "Cached diagnosis");
        Ok(())
    }
}

/// `SQLite`-backed cache with expiry, shareable across processes.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    store: SqliteStore,
    ttl: Duration,
}

impl SqliteCache {
    /// Cache over `store` whose entries live for `ttl`.
    #[must_use]
    pub const fn new(store: SqliteStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait]
impl ContentCache for SqliteCache {
    async fn get(&self, key: &LogFingerprint) -> Result<Option<Diagnosis>, StorageError> {
        let row = sqlx::query(
            "SELECT diagnosis FROM analysis_cache WHERE fingerprint = ? AND expires_at > ?",
        )
        .bind(key.as_str())
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.store.pool)
        .await
        .map_err(|e| SqliteStore::query_error("cache_get", &e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row
            .try_get("diagnosis")
            .map_err(|e| SqliteStore::query_error("cache_get", &e))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn put(&self, key: &LogFingerprint, diagnosis: &Diagnosis) -> Result<(), StorageError> {
        let now = Utc::now();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT OR REPLACE INTO analysis_cache (fingerprint, diagnosis, created_at, expires_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(key.as_str())
        .bind(serde_json::to_string(diagnosis)?)
        .bind(now.to_rfc3339())
        .bind(now.timestamp().saturating_add(ttl))
        .execute(&self.store.pool)
        .await
        .map_err(|e| SqliteStore::query_error("cache_put", &e))?;
        Ok(())
    }
}

/// A cache that never stores anything (`CACHE_DISABLED`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl ContentCache for DisabledCache {
    async fn get(&self, _key: &LogFingerprint) -> Result<Option<Diagnosis>, StorageError> {
        Ok(None)
    }

    async fn put(&self, _key: &LogFingerprint, _diagnosis: &Diagnosis) -> Result<(), StorageError> {
        Ok(())
    }
}
