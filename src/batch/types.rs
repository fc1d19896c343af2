// src/batch/types.rs
// Persisted and transient data types for the Batched Generator (spec §3, §4.7).

use serde::{Deserialize, Serialize};

/// Configuration snapshot embedded in persisted `BatchProgress` (spec §6
/// "Persisted state" nested `config` object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub model: String,
    pub max_concurrent: usize,
    pub timeout_ms: u64,
    pub min_complexity: f64,
    pub cost_limit: Option<f64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            model: "sonnet".to_string(),
            max_concurrent: 4,
            timeout_ms: 900_000,
            min_complexity: 0.0,
            cost_limit: None,
        }
    }
}

/// Error returned when a `BatchConfig.batch_size` falls outside 1..=50.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("batch size {0} outside accepted range 1..=50")]
pub struct InvalidBatchSize(pub usize);

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 50;

pub fn validate_batch_size(size: usize) -> Result<(), InvalidBatchSize> {
    if (MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(InvalidBatchSize(size))
    }
}

/// Sole source of truth for resume: persisted after every batch (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub run_id: String,
    pub project_path: String,
    pub total_tasks: usize,
    pub total_batches: usize,
    pub next_batch_index: u32,
    pub completed_batches: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub estimated_total_cost: f64,
    pub actual_cumulative_cost: f64,
    pub started_at_ms: u64,
    pub last_updated_at_ms: u64,
    pub config: BatchConfig,
}

impl BatchProgress {
    pub fn new(run_id: String, project_path: String, total_tasks: usize, batch_size: usize, config: BatchConfig, now_ms: u64) -> Self {
        let total_batches = total_tasks.div_ceil(batch_size.max(1));
        Self {
            run_id,
            project_path,
            total_tasks,
            total_batches,
            next_batch_index: 0,
            completed_batches: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            estimated_total_cost: 0.0,
            actual_cumulative_cost: 0.0,
            started_at_ms: now_ms,
            last_updated_at_ms: now_ms,
            config,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.next_batch_index as usize >= self.total_batches
    }
}

/// Whether batching a gap report is worthwhile (spec §4.7 `validateBatchingBenefit`).
#[derive(Debug, Clone, PartialEq)]
pub struct BatchingBenefit {
    pub beneficial: bool,
    pub reason: String,
}

/// A slice of tasks ready for execution, as returned by `getNextBatch`.
#[derive(Debug, Clone)]
pub struct NextBatch {
    pub index: u32,
    pub tasks: Vec<crate::orchestrator::Task>,
    pub estimated_cost: f64,
    pub estimated_tokens: u64,
}

/// Statistics for one completed batch (spec §4.7 `generateBatch` return shape).
#[derive(Debug, Clone)]
pub struct BatchRunStats {
    pub completed: usize,
    pub failed: usize,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub duration_ms: u64,
}

/// The full result of `generateBatch`: what `updateBatchState` consumes.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub batch_index: u32,
    pub batch_size: usize,
    pub results: Vec<crate::orchestrator::ProcessResult>,
    pub stats: BatchRunStats,
}
