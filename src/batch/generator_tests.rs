// src/batch/generator_tests.rs

use super::*;
use crate::orchestrator::{OrchestratorConfig, TaskOrchestrator};
use crate::process_monitor::FakeProcessMonitor;
use crate::timer::TokioTimerService;
use std::path::PathBuf;

fn gap_entry(i: usize) -> GapEntry {
    GapEntry {
        source_file: PathBuf::from(format!("src/mod_{i}.rs")),
        test_file: PathBuf::from(format!("tests/mod_{i}_test.rs")),
        prompt: "generate tests".to_string(),
        estimated_input_tokens: 100,
        estimated_output_tokens: 50,
        complexity: 1.0,
    }
}

fn gap_report(n: usize) -> GapReport {
    (0..n).map(gap_entry).collect()
}

fn generator(target: PathBuf, cost_limit: Option<f64>) -> (BatchedGenerator, PathBuf) {
    let timer: Arc<dyn TimerService> = Arc::new(TokioTimerService::new());
    let process_monitor = Arc::new(FakeProcessMonitor::new());
    let config = OrchestratorConfig {
        max_concurrent: 2,
        max_retries: 0,
        tool_install_path: target.clone(),
        ai_cli_bin: "this-binary-does-not-exist-testgen".to_string(),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(TaskOrchestrator::new(config, timer.clone(), process_monitor));
    let batch_config = BatchConfig {
        batch_size: 2,
        cost_limit,
        ..BatchConfig::default()
    };
    (
        BatchedGenerator::new(orchestrator, timer, batch_config).unwrap(),
        target,
    )
}

#[test]
fn benefit_requires_at_least_twice_batch_size() {
    let (generator, target) = generator(PathBuf::from("/tmp/proj"), None);
    let _ = &target;
    assert!(!generator.validate_batching_benefit(&gap_report(3)).beneficial);
    assert!(generator.validate_batching_benefit(&gap_report(4)).beneficial);
}

#[test]
fn initialize_batch_state_populates_estimated_total_cost() {
    let dir = tempfile::tempdir().unwrap();
    let (generator, _) = generator(dir.path().to_path_buf(), None);
    let report = gap_report(4);

    let progress = generator
        .initialize_batch_state(dir.path(), "run-1".to_string(), &report)
        .unwrap();

    let pricing = crate::orchestrator::pricing::get_pricing(&BatchConfig::default().model);
    let expected: f64 = report
        .iter()
        .map(|entry| pricing.calculate_cost(entry.estimated_input_tokens, entry.estimated_output_tokens))
        .sum();

    assert!(progress.estimated_total_cost > 0.0);
    assert!((progress.estimated_total_cost - expected).abs() < 1e-9);
}

#[test]
fn next_batch_slices_sequentially_and_ends_at_completion() {
    let dir = tempfile::tempdir().unwrap();
    let (generator, _) = generator(dir.path().to_path_buf(), None);
    let report = gap_report(5);

    generator
        .initialize_batch_state(dir.path(), "run-1".to_string(), &report)
        .unwrap();

    let first = generator.get_next_batch(dir.path(), &report).unwrap().unwrap();
    assert_eq!(first.index, 0);
    assert_eq!(first.tasks.len(), 2);

    let mut progress = state::load(dir.path()).unwrap().unwrap();
    progress.next_batch_index = 3;
    state::save(dir.path(), &progress).unwrap();

    assert!(generator.get_next_batch(dir.path(), &report).unwrap().is_none());
}

#[tokio::test]
async fn generate_batch_refuses_when_cost_limit_exceeded() {
    let dir = tempfile::tempdir().unwrap();
    let (generator, target) = generator(dir.path().to_path_buf(), Some(0.0000001));
    let report = gap_report(4);

    let err = generator.generate_batch(&report, 0, &target).await.unwrap_err();
    assert!(matches!(err, crate::error::OrchestratorError::BudgetExceeded { .. }));
}

#[tokio::test]
async fn generate_batch_runs_and_update_state_advances_index() {
    let dir = tempfile::tempdir().unwrap();
    let (generator, target) = generator(dir.path().to_path_buf(), None);
    let report = gap_report(4);

    generator
        .initialize_batch_state(dir.path(), "run-1".to_string(), &report)
        .unwrap();

    let result = generator.generate_batch(&report, 0, &target).await.unwrap();
    assert_eq!(result.batch_index, 0);
    assert_eq!(result.results.len(), 2);

    let progress = generator.update_batch_state(dir.path(), "run-1", &report, &result).unwrap();
    assert_eq!(progress.next_batch_index, 1);
    assert_eq!(progress.completed_batches, 1);
}

#[test]
fn progress_report_reports_absent_state_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let (generator, _) = generator(dir.path().to_path_buf(), None);
    let report = generator.get_progress_report(dir.path()).unwrap();
    assert!(report.contains("No batch run in progress"));
}

#[test]
fn cleanup_removes_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let (generator, _) = generator(dir.path().to_path_buf(), None);
    let report = gap_report(4);

    generator
        .initialize_batch_state(dir.path(), "run-1".to_string(), &report)
        .unwrap();
    generator.cleanup_batch_state(dir.path()).unwrap();

    assert!(state::load(dir.path()).unwrap().is_none());
}
