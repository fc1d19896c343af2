// src/cli/status.rs
// `testgen-orchestrator status`: print a human-readable progress report.

use crate::cli::BatchOverrides;
use crate::cli::common::build_generator;
use anyhow::Result;
use std::path::PathBuf;

pub async fn run_status(project: PathBuf) -> Result<()> {
    let generator = build_generator(&project, &BatchOverrides::default())?;
    println!("{}", generator.get_progress_report(&project)?);
    Ok(())
}
