// src/cli/resume.rs
// `testgen-orchestrator resume`: continue a previously started run from its
// persisted `nextBatchIndex`, refusing if no state is present.

use crate::cli::BatchOverrides;
use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub async fn run_resume(project: PathBuf, gap_report_path: PathBuf) -> Result<()> {
    if crate::batch::state_path(&project).metadata().is_err() {
        return Err(anyhow!(
            "no batch state found at {}; use `init` or `run` to start a new run",
            project.display()
        ));
    }

    crate::cli::run::run_generate(project, gap_report_path, BatchOverrides::default()).await
}
