// src/cli/common.rs
// Shared setup for the `init`/`run`/`resume` subcommands: load the gap
// report, apply config precedence (CLI > file > built-in defaults), and
// build a `BatchedGenerator` wired to a real `TaskOrchestrator`.

use crate::batch::{BatchedGenerator, GapReport};
use crate::cli::BatchOverrides;
use crate::config::FileConfig;
use crate::error::{OrchestratorError, Result};
use crate::orchestrator::{OrchestratorConfig, TaskOrchestrator};
use crate::process_monitor::SysinfoProcessMonitor;
use crate::timer::{TimerService, TokioTimerService};
use std::path::Path;
use std::sync::Arc;

pub fn load_gap_report(path: &Path) -> Result<GapReport> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(OrchestratorError::from)
}

pub fn build_generator(project: &Path, overrides: &BatchOverrides) -> Result<BatchedGenerator> {
    let file_config = FileConfig::load();

    let mut orchestrator_config = file_config.apply_to_orchestrator(OrchestratorConfig::default());
    orchestrator_config.tool_install_path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    if let Some(ref model) = overrides.model {
        orchestrator_config.model = model.clone();
    }
    if overrides.fallback_model.is_some() {
        orchestrator_config.fallback_model = overrides.fallback_model.clone();
    }
    if let Some(max_concurrent) = overrides.max_concurrent {
        orchestrator_config.max_concurrent = max_concurrent;
    }

    let mut batch_config = file_config.batch;
    if let Some(batch_size) = overrides.batch_size {
        batch_config.batch_size = batch_size;
    }
    if let Some(ref model) = overrides.model {
        batch_config.model = model.clone();
    }
    if let Some(max_concurrent) = overrides.max_concurrent {
        batch_config.max_concurrent = max_concurrent;
    }
    if overrides.cost_limit.is_some() {
        batch_config.cost_limit = overrides.cost_limit;
    }
    let _ = project;

    let timer: Arc<dyn TimerService> = Arc::new(TokioTimerService::new());
    let process_monitor = Arc::new(SysinfoProcessMonitor::new());
    let orchestrator = Arc::new(TaskOrchestrator::new(orchestrator_config, timer.clone(), process_monitor));

    BatchedGenerator::new(orchestrator, timer, batch_config)
}
