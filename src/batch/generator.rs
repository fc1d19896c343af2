// src/batch/generator.rs
// Batched Generator (§4.7): wraps the Task Orchestrator with a resumable,
// fixed-size batching layer backed by atomic JSON persistence.

use crate::batch::state::{self, AdvisoryLock};
use crate::batch::types::{
    validate_batch_size, BatchConfig, BatchProgress, BatchResult, BatchRunStats, BatchingBenefit, NextBatch,
};
use crate::error::{OrchestratorError, Result};
use crate::orchestrator::pricing;
use crate::orchestrator::{Batch, Task, TaskOrchestrator};
use crate::timer::TimerService;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One externally produced gap-analysis entry, one per source file lacking
/// logical test coverage (out of scope: produced by gap analysis, §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapEntry {
    pub source_file: std::path::PathBuf,
    pub test_file: std::path::PathBuf,
    pub prompt: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub complexity: f64,
}

pub type GapReport = Vec<GapEntry>;

fn format_timestamp_ms(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

fn prepare_task(entry: &GapEntry, index: usize, model: &str) -> Task {
    let pricing = pricing::get_pricing(model);
    let estimated_cost = pricing.calculate_cost(entry.estimated_input_tokens, entry.estimated_output_tokens);
    Task {
        id: format!("task-{index}"),
        source_file: entry.source_file.clone(),
        test_file: entry.test_file.clone(),
        prompt: entry.prompt.clone(),
        estimated_input_tokens: entry.estimated_input_tokens,
        estimated_output_tokens: entry.estimated_output_tokens,
        estimated_cost,
        complexity: entry.complexity,
        priority: 0,
        model: model.to_string(),
        context: None,
    }
}

pub struct BatchedGenerator {
    orchestrator: Arc<TaskOrchestrator>,
    timer: Arc<dyn TimerService>,
    config: BatchConfig,
}

impl BatchedGenerator {
    pub fn new(orchestrator: Arc<TaskOrchestrator>, timer: Arc<dyn TimerService>, config: BatchConfig) -> Result<Self> {
        validate_batch_size(config.batch_size).map_err(|e| OrchestratorError::InvalidInput(e.to_string()))?;
        Ok(Self {
            orchestrator,
            timer,
            config,
        })
    }

    /// Beneficial iff the task count is at least `2 x batchSize` (spec §4.7).
    pub fn validate_batching_benefit(&self, gap_report: &GapReport) -> BatchingBenefit {
        let threshold = self.config.batch_size * 2;
        if gap_report.len() >= threshold {
            BatchingBenefit {
                beneficial: true,
                reason: format!("{} tasks >= 2x batch size ({threshold})", gap_report.len()),
            }
        } else {
            BatchingBenefit {
                beneficial: false,
                reason: format!(
                    "{} tasks below 2x batch size ({threshold}); a single pass is as effective",
                    gap_report.len()
                ),
            }
        }
    }

    /// Persist a fresh `BatchProgress` with `nextBatchIndex=0`.
    pub fn initialize_batch_state(&self, project: &Path, run_id: String, gap_report: &GapReport) -> Result<BatchProgress> {
        let _lock = AdvisoryLock::acquire(project)?;
        let now = self.timer.now_ms();
        let mut progress = BatchProgress::new(
            run_id,
            project.display().to_string(),
            gap_report.len(),
            self.config.batch_size,
            self.config.clone(),
            now,
        );
        progress.estimated_total_cost = gap_report
            .iter()
            .enumerate()
            .map(|(i, entry)| prepare_task(entry, i, &self.config.model).estimated_cost)
            .sum();
        state::save(project, &progress)?;
        Ok(progress)
    }

    /// Load state (absent is treated as a zero-progress run) and slice out
    /// the next batch of tasks, or `None` once all batches are complete.
    pub fn get_next_batch(&self, project: &Path, gap_report: &GapReport) -> Result<Option<NextBatch>> {
        let progress = state::load(project)?;
        let index = progress.as_ref().map(|p| p.next_batch_index).unwrap_or(0);
        let total_batches = gap_report.len().div_ceil(self.config.batch_size.max(1));

        if (index as usize) >= total_batches {
            return Ok(None);
        }

        let start = index as usize * self.config.batch_size;
        let end = (start + self.config.batch_size).min(gap_report.len());
        if start >= gap_report.len() {
            return Ok(None);
        }

        let tasks: Vec<Task> = gap_report[start..end]
            .iter()
            .enumerate()
            .map(|(offset, entry)| prepare_task(entry, start + offset, &self.config.model))
            .collect();

        let estimated_cost = tasks.iter().map(|t| t.estimated_cost).sum();
        let estimated_tokens = tasks
            .iter()
            .map(|t| t.estimated_input_tokens + t.estimated_output_tokens)
            .sum();

        Ok(Some(NextBatch {
            index,
            tasks,
            estimated_cost,
            estimated_tokens,
        }))
    }

    /// Prepare tasks, refuse if the batch's estimated cost exceeds
    /// `costLimit`, invoke the Orchestrator, and return a `BatchResult`.
    pub async fn generate_batch(&self, gap_report: &GapReport, batch_index: u32, target: &Path) -> Result<BatchResult> {
        let next = self
            .get_next_batch_at(gap_report, batch_index)
            .ok_or_else(|| OrchestratorError::InvalidInput(format!("batch index {batch_index} out of range")))?;

        if let Some(limit) = self.config.cost_limit {
            if next.estimated_cost > limit {
                return Err(OrchestratorError::BudgetExceeded {
                    estimated: next.estimated_cost,
                    limit,
                });
            }
        }

        let batch = Batch {
            id: format!("batch-{batch_index}"),
            index: batch_index,
            tasks: next.tasks,
            estimated_tokens: next.estimated_tokens,
            estimated_cost: next.estimated_cost,
            max_concurrent: self.config.max_concurrent,
        };

        let start = self.timer.now_ms();
        let results = self.orchestrator.process_batch(&batch, target).await?;
        let duration_ms = self.timer.now_ms().saturating_sub(start);

        let completed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - completed;
        let total_cost = results.iter().map(|r| r.actual_cost).sum();
        let total_tokens = results.iter().map(|r| r.input_tokens + r.output_tokens).sum();

        Ok(BatchResult {
            batch_index,
            batch_size: batch.tasks.len(),
            results,
            stats: BatchRunStats {
                completed,
                failed,
                total_cost,
                total_tokens,
                duration_ms,
            },
        })
    }

    fn get_next_batch_at(&self, gap_report: &GapReport, index: u32) -> Option<NextBatch> {
        let start = index as usize * self.config.batch_size;
        if start >= gap_report.len() {
            return None;
        }
        let end = (start + self.config.batch_size).min(gap_report.len());
        let tasks: Vec<Task> = gap_report[start..end]
            .iter()
            .enumerate()
            .map(|(offset, entry)| prepare_task(entry, start + offset, &self.config.model))
            .collect();
        let estimated_cost = tasks.iter().map(|t| t.estimated_cost).sum();
        let estimated_tokens = tasks
            .iter()
            .map(|t| t.estimated_input_tokens + t.estimated_output_tokens)
            .sum();
        Some(NextBatch {
            index,
            tasks,
            estimated_cost,
            estimated_tokens,
        })
    }

    /// Load state, increment counters from `batch_result`, advance
    /// `nextBatchIndex`, persist atomically, and return the new state.
    pub fn update_batch_state(&self, project: &Path, run_id: &str, gap_report: &GapReport, batch_result: &BatchResult) -> Result<BatchProgress> {
        let _lock = AdvisoryLock::acquire(project)?;
        let mut progress = match state::load(project)? {
            Some(progress) => progress,
            None => {
                let mut progress = BatchProgress::new(
                    run_id.to_string(),
                    project.display().to_string(),
                    gap_report.len(),
                    self.config.batch_size,
                    self.config.clone(),
                    self.timer.now_ms(),
                );
                progress.estimated_total_cost = gap_report
                    .iter()
                    .enumerate()
                    .map(|(i, entry)| prepare_task(entry, i, &self.config.model).estimated_cost)
                    .sum();
                progress
            }
        };

        progress.completed_batches += 1;
        progress.completed_tasks += batch_result.stats.completed;
        progress.failed_tasks += batch_result.stats.failed;
        progress.actual_cumulative_cost += batch_result.stats.total_cost;
        progress.next_batch_index = batch_result.batch_index + 1;
        progress.last_updated_at_ms = self.timer.now_ms();

        state::save(project, &progress)?;
        info!(
            next_batch_index = progress.next_batch_index,
            completed_tasks = progress.completed_tasks,
            "updated batch state"
        );
        Ok(progress)
    }

    /// Human-readable multi-line progress report for a resuming operator.
    pub fn get_progress_report(&self, project: &Path) -> Result<String> {
        let Some(progress) = state::load(project)? else {
            return Ok("No batch run in progress for this project.".to_string());
        };

        let avg_cost = if progress.completed_tasks > 0 {
            progress.actual_cumulative_cost / progress.completed_tasks as f64
        } else {
            0.0
        };

        Ok(format!(
            "Run {}\nStarted: {}\nLast updated: {}\nBatches: {}/{}\nTasks completed: {}/{}\nTasks failed: {}\nCost so far: ${:.4} (avg ${:.4}/task)\nEstimated total cost: ${:.4}\nNext batch index: {}",
            progress.run_id,
            format_timestamp_ms(progress.started_at_ms),
            format_timestamp_ms(progress.last_updated_at_ms),
            progress.completed_batches,
            progress.total_batches,
            progress.completed_tasks,
            progress.total_tasks,
            progress.failed_tasks,
            progress.actual_cumulative_cost,
            avg_cost,
            progress.estimated_total_cost,
            progress.next_batch_index,
        ))
    }

    /// Delete the persisted state file.
    pub fn cleanup_batch_state(&self, project: &Path) -> Result<()> {
        state::cleanup(project)
    }
}

#[cfg(test)]
#[path = "generator_tests.rs"]
mod tests;
