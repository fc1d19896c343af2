// src/cli/init.rs
// `testgen-orchestrator init`: validate a gap report and write fresh batch
// state, without executing any batch yet.

use crate::cli::common::{build_generator, load_gap_report};
use crate::cli::BatchOverrides;
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

pub async fn run_init(project: PathBuf, gap_report_path: PathBuf, overrides: BatchOverrides) -> Result<()> {
    let gap_report = load_gap_report(&gap_report_path)?;
    let generator = build_generator(&project, &overrides)?;

    let benefit = generator.validate_batching_benefit(&gap_report);
    if !benefit.beneficial {
        info!(reason = %benefit.reason, "batching offers little benefit for this gap report; proceeding anyway");
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let progress = generator.initialize_batch_state(&project, run_id.clone(), &gap_report)?;

    println!(
        "Initialized run {run_id} for {} tasks across {} batches.",
        progress.total_tasks, progress.total_batches
    );
    Ok(())
}
