//! Durable state.
//!
//! This module provides:
//! - [`AuditLog`]: append-only JSON-lines record of every decision
//! - [`BackupStore`]: snapshots of files before they are overwritten
//! - [`ContentCache`]: fingerprint → diagnosis cache
//! - [`JobQueue`]: durable queue feeding the worker
//! - [`KeyedLocks`]: per-fingerprint and per-path serialization
//!
//! # Backends
//!
//! The cache and the queue each have a file implementation (one file per
//! entry under the state directory) and a `SQLite` implementation for
//! several worker processes sharing one database. [`Stores::open`] picks
//! them from [`StoreBackend`].
//!
//! # Example
//!
//! ```ignore
//! use ci_healer::config::StateConfig;
//! use ci_healer::storage::Stores;
//!
//! let stores = Stores::open(&StateConfig::under("logs")).await?;
//! let pending = stores.queue.pending().await?;
//! ```

mod audit;
mod backup;
mod cache;
mod core;
mod fingerprint;
mod fs;
mod locks;
mod queue;

pub use self::core::SqliteStore;
pub use audit::{AuditEntry, AuditEvent, AuditLog};
pub use backup::{BackupStore, FileBackupStore};
pub use cache::{ContentCache, DisabledCache, FileCache, SqliteCache};
pub use fingerprint::LogFingerprint;
pub use fs::{append_json_line, read_json_lines, write_atomic};
pub use locks::{KeyGuard, KeyedLocks};
pub use queue::{FileQueue, Job, JobQueue, NewJob, SqliteQueue};

#[cfg(test)]
pub use backup::MockBackupStore;
#[cfg(test)]
pub use cache::MockContentCache;
#[cfg(test)]
pub use queue::MockJobQueue;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{StateConfig, StoreBackend};
use crate::error::StorageError;

/// The stores a process needs, built from configuration.
#[derive(Clone)]
pub struct Stores {
    /// Analysis cache.
    pub cache: Arc<dyn ContentCache>,
    /// Job queue.
    pub queue: Arc<dyn JobQueue>,
    /// Backup store.
    pub backups: Arc<dyn BackupStore>,
    /// Audit log.
    pub audit: AuditLog,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores")
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

impl Stores {
    /// Open every store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the `SQLite` database cannot be opened.
    pub async fn open(config: &StateConfig) -> Result<Self, StorageError> {
        let (cache, queue): (Arc<dyn ContentCache>, Arc<dyn JobQueue>) = match config.backend {
            StoreBackend::File => (
                Arc::new(FileCache::new(&config.cache_dir)),
                Arc::new(FileQueue::new(&config.queue_dir)),
            ),
            StoreBackend::Sqlite => {
                let store = SqliteStore::open(&config.database_path).await?;
                (
                    Arc::new(SqliteCache::new(
                        store.clone(),
                        Duration::from_secs(config.cache_ttl_secs),
                    )),
                    Arc::new(SqliteQueue::new(store)),
                )
            }
        };
        let cache: Arc<dyn ContentCache> = if config.cache_disabled {
            Arc::new(DisabledCache)
        } else {
            cache
        };

        info!(backend = ?config.backend, cache_disabled = config.cache_disabled, "Stores opened");
        Ok(Self {
            cache,
            queue,
            backups: Arc::new(FileBackupStore::new(&config.backup_dir)),
            audit: AuditLog::new(&config.audit_log_path),
        })
    }
}
