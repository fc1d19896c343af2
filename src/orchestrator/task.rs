// src/orchestrator/task.rs
// Core data model shared by the Task Orchestrator and the Batched Generator
// (spec §3).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One AI generation unit addressing exactly one gap-analysis entry.
/// Immutable once created; referenced by exactly one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub source_file: PathBuf,
    pub test_file: PathBuf,
    pub prompt: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub estimated_cost: f64,
    pub complexity: f64,
    pub priority: u32,
    pub model: String,
    pub context: Option<serde_json::Value>,
}

/// A fixed-size slice of tasks scheduled together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub index: u32,
    pub tasks: Vec<Task>,
    pub estimated_tokens: u64,
    pub estimated_cost: f64,
    pub max_concurrent: usize,
}

impl Batch {
    pub fn estimated_cost(&self) -> f64 {
        self.tasks.iter().map(|t| t.estimated_cost).sum()
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.tasks
            .iter()
            .map(|t| t.estimated_input_tokens + t.estimated_output_tokens)
            .sum()
    }
}

/// Why a task did not succeed (spec §7 error taxonomy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    TransientCli,
    HealthTermination,
    Timeout,
    Budget,
    AuthOrConfig,
    CircuitOpen,
    SelfTarget,
    AgentsDisabled,
    ProcessLimit,
    CliUnavailable,
    Cancelled,
}

impl FailureReason {
    /// Retryable per §4.6 step 6 / §7 taxonomy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureReason::TransientCli | FailureReason::HealthTermination | FailureReason::Timeout
        )
    }
}

/// Outcome of one task's full execution, including any retries consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResult {
    pub task_id: String,
    pub success: bool,
    pub content: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub actual_cost: f64,
    pub duration_ms: u64,
    pub error_reason: Option<FailureReason>,
    pub retries_consumed: u32,
    pub model_used: String,
    pub degraded: bool,
}

impl ProcessResult {
    pub fn failure(task: &Task, reason: FailureReason, retries_consumed: u32, duration_ms: u64) -> Self {
        Self {
            task_id: task.id.clone(),
            success: false,
            content: None,
            input_tokens: 0,
            output_tokens: 0,
            actual_cost: 0.0,
            duration_ms,
            error_reason: Some(reason),
            retries_consumed,
            model_used: task.model.clone(),
            degraded: false,
        }
    }

    pub fn degraded(task: &Task, reason: FailureReason, retries_consumed: u32, duration_ms: u64) -> Self {
        let mut result = Self::failure(task, reason, retries_consumed, duration_ms);
        result.degraded = true;
        result.content = Some(String::new());
        result
    }
}

/// Live snapshot of cumulative orchestrator counters (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cumulative_cost: f64,
    pub cumulative_tokens: u64,
    pub cumulative_duration_ms: u64,
    pub circuit_breaker_state: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(cost: f64) -> Task {
        Task {
            id: "t1".to_string(),
            source_file: PathBuf::from("src/lib.rs"),
            test_file: PathBuf::from("tests/lib_test.rs"),
            prompt: "generate tests".to_string(),
            estimated_input_tokens: 1_000,
            estimated_output_tokens: 500,
            estimated_cost: cost,
            complexity: 1.0,
            priority: 0,
            model: "sonnet".to_string(),
            context: None,
        }
    }

    #[test]
    fn batch_estimated_cost_sums_tasks() {
        let batch = Batch {
            id: "b1".to_string(),
            index: 0,
            tasks: vec![sample_task(0.10), sample_task(0.25)],
            estimated_tokens: 0,
            estimated_cost: 0.0,
            max_concurrent: 2,
        };
        assert!((batch.estimated_cost() - 0.35).abs() < 1e-9);
    }

    #[test]
    fn transient_and_timeout_are_retryable_auth_is_not() {
        assert!(FailureReason::TransientCli.is_retryable());
        assert!(FailureReason::Timeout.is_retryable());
        assert!(!FailureReason::AuthOrConfig.is_retryable());
        assert!(!FailureReason::CircuitOpen.is_retryable());
    }

    #[test]
    fn degraded_result_carries_empty_marked_payload() {
        let task = sample_task(0.1);
        let result = ProcessResult::degraded(&task, FailureReason::Timeout, 1, 500);
        assert!(result.degraded);
        assert_eq!(result.content, Some(String::new()));
        assert!(!result.success);
    }
}
