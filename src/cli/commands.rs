//! Command execution.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use super::{report, App, Cli, Command};
use crate::config::Config;
use crate::engine::RunRequest;
use crate::error::{AppError, StorageError};
use crate::providers::{simulated_logs, Provider};
use crate::rollback::RollbackManager;
use crate::shutdown::ShutdownSignal;
use crate::storage::NewJob;
use crate::traits::{LogSource, LogSources};
use crate::worker::Worker;

/// Parse-independent entry point used by `main`.
///
/// Installs signal handlers, opens state and runs the command. Errors are
/// logged and mapped to a failing exit code.
pub async fn run(cli: Cli, config: Config) -> ExitCode {
    let shutdown = ShutdownSignal::new();
    shutdown.install_handlers();

    let app = match App::open(config, shutdown).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match execute(cli, &app).await {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

/// Run `cli` against `app`, returning the process exit status.
///
/// Every terminal run outcome exits 0; a failed rollback exits 1.
///
/// # Errors
///
/// Returns [`AppError`] for configuration, provider, storage or internal
/// engine failures.
pub async fn execute(cli: Cli, app: &App) -> Result<u8, AppError> {
    match cli.command {
        Some(Command::Worker { once }) => work(app, once).await,
        Some(Command::Enqueue {
            run_id,
            provider,
            logs,
            priority,
        }) => {
            let mut job = NewJob::new(provider, run_id).with_priority(priority);
            if let Some(logs) = logs {
                job = job.with_logs(logs);
            }
            let job = app.stores.queue.enqueue(job).await?;
            info!(job_id = %job.id, run_id = %job.run_id, "Job enqueued");
            println!("{}", job.id);
            Ok(0)
        }
        Some(Command::Report { kind, hours }) => {
            let value = report::render(kind, hours, app)?;
            println!("{}", pretty(&value)?);
            Ok(0)
        }
        None if cli.rollback => rollback(app, cli.rollback_n).await,
        None => heal(&cli, app).await,
    }
}

async fn heal(cli: &Cli, app: &App) -> Result<u8, AppError> {
    let provider = cli.effective_provider();
    let run_id = cli.effective_run_id();
    let source = app.registry.source_for(provider)?;
    if !matches!(provider, Provider::Local | Provider::Github) {
        source.validate_env()?;
    }
    info!(%provider, run_id, dry_run = cli.dry_run, "Agent starting");

    let logs = match (&cli.logs, cli.simulate_failure) {
        (Some(logs), _) => logs.clone(),
        (None, Some(kind)) => simulated_logs(kind),
        (None, None) => source.fetch_logs(run_id).await?,
    };

    let engine = app.engine()?;
    let request = RunRequest::new(run_id, provider, source.context(), logs).dry_run(cli.dry_run);
    let report = engine.run(request).await?;

    println!("{}", pretty(&report)?);
    Ok(0)
}

async fn rollback(app: &App, n: usize) -> Result<u8, AppError> {
    let manager = RollbackManager::new(app.stores.audit.clone(), Arc::clone(&app.stores.backups));
    let report = if n > 1 {
        manager.restore_n(n).await?
    } else {
        manager.restore_last().await?
    };
    let summary = report.summary();
    info!(success = report.is_success(), message = %summary, "Rollback");
    println!("{summary}");
    Ok(u8::from(!report.is_success()))
}

async fn work(app: &App, once: bool) -> Result<u8, AppError> {
    let sources: Arc<dyn LogSources> = app.registry.clone();
    let worker = Worker::new(
        Arc::new(app.engine()?),
        Arc::clone(&app.stores.queue),
        sources,
        app.config.worker.clone(),
        app.shutdown.clone(),
    );
    let stats = if once { worker.drain().await } else { worker.run().await };
    println!("completed={} failed={}", stats.completed, stats.failed);
    Ok(0)
}

fn pretty<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string_pretty(value).map_err(StorageError::from)
}
