//! Command-line interface.
//!
//! The default command heals one run:
//!
//! ```bash
//! ci-healer --provider local
//! ci-healer --mode ci --logs "$(cat build_logs.txt)"
//! ci-healer --provider jenkins --run-id myjob/123
//! ci-healer --dry-run --simulate-failure npm-404
//! ci-healer --rollback --rollback-n 2
//! ```
//!
//! Subcommands feed and drain the job queue and print reports.

mod app;
mod commands;
mod report;


pub use app::App;
pub use commands::{execute, run};
pub use report::{category_counts, token_summary, TokenSummary};

use clap::{Parser, Subcommand, ValueEnum};

use crate::providers::{Provider, SimulatedFailure};

/// Run id used when none is given.
pub const DEFAULT_RUN_ID: &str = "local-simulation";

/// Autonomous CI/CD failure remediation.
#[derive(Debug, Parser)]
#[command(name = "ci-healer", version, about)]
pub struct Cli {
    /// Run or build id to analyze (Jenkins: `job/sub/123`).
    #[arg(long)]
    pub run_id: Option<String>,

    /// CI provider.
    #[arg(long, default_value = "local")]
    pub provider: Provider,

    /// `ci` analyzes the GitHub Actions run this process is part of.
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Raw build logs; skips fetching from the provider.
    #[arg(long)]
    pub logs: Option<String>,

    /// Analyze and propose a fix without writing it.
    #[arg(long)]
    pub dry_run: bool,

    /// Use simulated failure logs (missing-env, npm-404, syntax-error).
    #[arg(
        long,
        value_name = "KIND",
        num_args = 0..=1,
        default_missing_value = "missing-env"
    )]
    pub simulate_failure: Option<SimulatedFailure>,

    /// Restore the most recent applied fix from its backup.
    #[arg(long)]
    pub rollback: bool,

    /// With `--rollback`, how many fixes to undo.
    #[arg(long, default_value_t = 1)]
    pub rollback_n: usize,

    /// Subcommand.
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Provider after applying `--mode`.
    #[must_use]
    pub const fn effective_provider(&self) -> Provider {
        match self.mode {
            Some(Mode::Ci) => Provider::Github,
            _ => self.provider,
        }
    }

    /// Run id, defaulting to [`DEFAULT_RUN_ID`].
    #[must_use]
    pub fn effective_run_id(&self) -> &str {
        self.run_id.as_deref().unwrap_or(DEFAULT_RUN_ID)
    }
}

/// Execution context shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Running inside CI.
    Ci,
    /// Running on a developer machine.
    Local,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process queued jobs until interrupted.
    Worker {
        /// Exit once the queue is empty.
        #[arg(long)]
        once: bool,
    },
    /// Queue a run for the worker.
    Enqueue {
        /// Run or build id.
        #[arg(long)]
        run_id: String,
        /// CI provider.
        #[arg(long, default_value = "local")]
        provider: Provider,
        /// Logs to analyze instead of fetching them.
        #[arg(long)]
        logs: Option<String>,
        /// Stored with the job; not used for ordering.
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },
    /// Print a report as JSON.
    Report {
        /// Which report.
        #[arg(value_enum)]
        kind: ReportKind,
        /// Window in hours for `slo`.
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
}

/// Available reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    /// Token usage totals.
    Tokens,
    /// Model spend per applied fix.
    Cost,
    /// Success rate and latency.
    Slo,
    /// Analysis failures by category.
    Categories,
}
