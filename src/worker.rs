//! Queue worker.
//!
//! Drains a [`JobQueue`] into the [`RemediationEngine`], one job at a time.
//! Each job runs on its own task so a panic is contained to that job; errors
//! are logged and the loop moves on. Shutdown is observed between jobs and
//! inside the engine between stages.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::engine::{RemediationEngine, RunReport, RunRequest};
use crate::error::ProviderError;
use crate::shutdown::ShutdownSignal;
use crate::storage::{Job, JobQueue};
use crate::traits::LogSources;

/// Counters for one worker session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs that reached a terminal outcome.
    pub completed: u64,
    /// Jobs that errored or panicked.
    pub failed: u64,
}

/// Single-consumer queue worker.
pub struct Worker {
    engine: Arc<RemediationEngine>,
    queue: Arc<dyn JobQueue>,
    sources: Arc<dyn LogSources>,
    config: WorkerConfig,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        engine: Arc<RemediationEngine>,
        queue: Arc<dyn JobQueue>,
        sources: Arc<dyn LogSources>,
        config: WorkerConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            engine,
            queue,
            sources,
            config,
            shutdown,
        }
    }

    /// Process jobs until shutdown is requested.
    pub async fn run(&self) -> WorkerStats {
        let wait = Duration::from_millis(self.config.dequeue_wait_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        let mut stats = WorkerStats::default();

        info!(
            wait_ms = self.config.dequeue_wait_ms,
            poll_ms = self.config.poll_interval_ms,
            "Worker started"
        );

        while !self.shutdown.is_requested() {
            match self.queue.dequeue(wait, poll).await {
                Ok(Some(job)) => self.handle(job, &mut stats).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Dequeue failed");
                    tokio::time::sleep(poll).await;
                }
            }
        }

        info!(completed = stats.completed, failed = stats.failed, "Worker stopped");
        stats
    }

    /// Process jobs until the queue is empty or shutdown is requested.
    pub async fn drain(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while !self.shutdown.is_requested() {
            match self.queue.try_dequeue().await {
                Ok(Some(job)) => self.handle(job, &mut stats).await,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Dequeue failed");
                    break;
                }
            }
        }
        info!(completed = stats.completed, failed = stats.failed, "Queue drained");
        stats
    }

    async fn handle(&self, job: Job, stats: &mut WorkerStats) {
        let job_id = job.id;
        match self.process(job).await {
            Ok(report) => {
                info!(%job_id, correlation_id = %report.correlation_id, outcome = report.outcome.name(), "Job finished");
                stats.completed += 1;
            }
            Err(reason) => {
                error!(%job_id, %reason, "Job failed");
                stats.failed += 1;
            }
        }
    }

    /// Run one job on its own task.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure if logs could not be obtained,
    /// the engine returned an error, or the task panicked.
    pub async fn process(&self, job: Job) -> Result<RunReport, String> {
        info!(job_id = %job.id, run_id = %job.run_id, provider = %job.provider, "Processing job");
        let request = self.request_for(job).await.map_err(|e| e.to_string())?;

        let engine = Arc::clone(&self.engine);
        match tokio::spawn(async move { engine.run(request).await }).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(e.to_string()),
            Err(join) if join.is_panic() => Err(format!("job panicked: {join}")),
            Err(join) => Err(format!("job aborted: {join}")),
        }
    }

    async fn request_for(&self, job: Job) -> Result<RunRequest, ProviderError> {
        let source = self.sources.source_for(job.provider)?;
        let logs = match job.logs {
            Some(logs) => cap_chars(logs, self.config.max_job_log_chars),
            None => {
                source.validate_env()?;
                source.fetch_logs(&job.run_id).await?
            }
        };
        Ok(RunRequest::new(job.run_id, job.provider, source.context(), logs))
    }
}

fn cap_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}
