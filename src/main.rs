// src/main.rs
// testgen-orchestrator binary entrypoint

use anyhow::Result;
use clap::Parser;
use testgen_orchestrator::cli::{run_generate, run_init, run_resume, run_status, Cli, Commands};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match &cli.command {
        Commands::Status { .. } => Level::WARN,
        Commands::Init { .. } => Level::INFO,
        Commands::Run { .. } | Commands::Resume { .. } => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        Commands::Init {
            project,
            gap_report,
            batch_overrides,
        } => run_init(project, gap_report, batch_overrides).await,
        Commands::Run {
            project,
            gap_report,
            batch_overrides,
        } => run_generate(project, gap_report, batch_overrides).await,
        Commands::Resume { project, gap_report } => run_resume(project, gap_report).await,
        Commands::Status { project } => run_status(project).await,
    }
}
