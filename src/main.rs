//! `ci-healer` binary entry point.
//!
//! Logs go to stderr; stdout carries run reports, job ids and report JSON.
//!
//! Coverage is excluded because the main function only wires the process
//! environment into [`ci_healer::cli::run`].

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ci_healer::cli::{self, Cli};
use ci_healer::config::{is_truthy, Config};

fn init_tracing(level: &str, json: bool) {
    let filter = level
        .parse()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();

    // Configuration decides the log format, so errors loading it are printed
    // with a default subscriber.
    let config = Config::from_env();
    let (level, json) = config.as_ref().map_or_else(
        |_| {
            (
                std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                std::env::var("LOG_JSON").is_ok_and(|v| is_truthy(&v)),
            )
        },
        |c| (c.log_level.clone(), c.log_json),
    );
    init_tracing(&level, json);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        state_backend = ?config.state.backend,
        model = %config.model.primary_model,
        threshold = config.pipeline.confidence_threshold,
        "ci-healer starting"
    );

    cli::run(args, config).await
}
