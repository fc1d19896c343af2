// src/cli/mod.rs
// CLI surface for manual batch operation (`run`, `resume`, `status`, `init`).
// The host tool's own CLI parsing (gap analysis, template rendering) remains
// out of scope (spec §1); this is this crate's own operator-facing CLI.

mod common;
pub mod init;
pub mod resume;
pub mod run;
pub mod status;

pub use init::run_init;
pub use resume::run_resume;
pub use run::run_generate;
pub use status::run_status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "testgen-orchestrator")]
#[command(about = "AI task orchestrator with heartbeat-monitored, resumable batched execution")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a gap report and initialize fresh batch state, without
    /// running any batches yet.
    Init {
        /// Target project directory.
        #[arg(short, long)]
        project: PathBuf,

        /// Path to a JSON array of gap-report entries.
        #[arg(short, long)]
        gap_report: PathBuf,

        #[command(flatten)]
        batch_overrides: BatchOverrides,
    },

    /// Run batches to completion (or until the circuit breaker / budget
    /// refuses further work), starting from any persisted progress.
    Run {
        /// Target project directory.
        #[arg(short, long)]
        project: PathBuf,

        /// Path to a JSON array of gap-report entries.
        #[arg(short, long)]
        gap_report: PathBuf,

        #[command(flatten)]
        batch_overrides: BatchOverrides,
    },

    /// Resume a previously started run from its persisted `nextBatchIndex`.
    Resume {
        /// Target project directory.
        #[arg(short, long)]
        project: PathBuf,

        /// Path to the same JSON gap report used to start the run.
        #[arg(short, long)]
        gap_report: PathBuf,
    },

    /// Print a human-readable progress report for a project's batch run.
    Status {
        /// Target project directory.
        #[arg(short, long)]
        project: PathBuf,
    },
}

/// CLI-flag overrides for `BatchConfig`/`OrchestratorConfig`. CLI flags win
/// over file config, which wins over built-in defaults (§6).
#[derive(clap::Args, Debug, Default)]
pub struct BatchOverrides {
    #[arg(long, env = "TESTGEN_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    #[arg(long, env = "TESTGEN_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "TESTGEN_FALLBACK_MODEL")]
    pub fallback_model: Option<String>,

    #[arg(long, env = "TESTGEN_MAX_CONCURRENT")]
    pub max_concurrent: Option<usize>,

    #[arg(long, env = "TESTGEN_COST_LIMIT")]
    pub cost_limit: Option<f64>,
}
