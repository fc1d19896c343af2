// src/cli/run.rs
// `testgen-orchestrator run`: initialize (if needed) and drive batches to
// completion, stopping early if the circuit breaker or a cost limit refuses
// further work.

use crate::cli::common::{build_generator, load_gap_report};
use crate::cli::BatchOverrides;
use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};

pub async fn run_generate(project: PathBuf, gap_report_path: PathBuf, overrides: BatchOverrides) -> Result<()> {
    let gap_report = load_gap_report(&gap_report_path)?;
    let generator = build_generator(&project, &overrides)?;

    if generator.get_next_batch(&project, &gap_report)?.is_none() {
        let run_id = uuid::Uuid::new_v4().to_string();
        generator.initialize_batch_state(&project, run_id, &gap_report)?;
    }

    loop {
        let Some(next) = generator.get_next_batch(&project, &gap_report)? else {
            break;
        };

        info!(batch_index = next.index, tasks = next.tasks.len(), "running batch");

        let batch_result = match generator.generate_batch(&gap_report, next.index, &project).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "batch generation refused; stopping run");
                println!("Run stopped: {err}");
                return Ok(());
            }
        };

        let progress_after = generator
            .update_batch_state(&project, "resume", &gap_report, &batch_result)
            .map_err(anyhow::Error::from)?;

        println!(
            "Batch {}: {} succeeded, {} failed (${:.4})",
            batch_result.batch_index, batch_result.stats.completed, batch_result.stats.failed, batch_result.stats.total_cost
        );

        if progress_after.is_complete() {
            break;
        }
    }

    println!("{}", generator.get_progress_report(&project)?);
    Ok(())
}
