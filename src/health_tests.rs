// src/health_tests.rs
// Unit tests for the Health Analyzer, split out of health.rs the way the
// teacher splits large test suites into sibling `_tests.rs` files
// (`db/memory_tests.rs`, `db/tasks_tests.rs`).

use super::*;

fn base_metrics() -> ProcessMetrics {
    ProcessMetrics {
        cpu_percent: 10.0,
        memory_mb: 100.0,
        output_rate: 5.0,
        last_output_time_ms: 0,
        error_count: 0,
        process_runtime_ms: 5_000,
        progress_marker_count: 0,
        is_waiting_for_input: false,
        now_ms: 5_000,
    }
}

#[test]
fn healthy_with_no_signals() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let verdict = analyzer.analyze(&base_metrics(), &config);
    assert!(verdict.is_healthy);
    assert!(!verdict.should_terminate);
    assert!(verdict.warnings.is_empty());
    assert!(verdict.reason.is_none());
}

/// Scenario 3 from spec §8: one line then 130s of silence, past early phase,
/// no progress markers -> silent termination.
#[test]
fn silent_process_past_early_phase_is_terminated() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        last_output_time_ms: 0,
        now_ms: 130_000,
        process_runtime_ms: 130_000,
        progress_marker_count: 0,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert!(!verdict.is_healthy);
    assert!(verdict.should_terminate);
    assert_eq!(verdict.reason.as_deref(), Some("silent"));
}

/// Scenario 4 from spec §8: silence inside the early phase is tolerated, but
/// still produces a tagged low-output-rate warning.
#[test]
fn silence_within_early_phase_is_tolerated_with_warning() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        last_output_time_ms: 5_000,
        now_ms: 45_000,
        process_runtime_ms: 45_000,
        progress_marker_count: 0,
        output_rate: 0.0,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert!(verdict.is_healthy);
    assert!(!verdict.should_terminate);
    assert!(verdict.warnings.contains(&"Low output rate (early phase)".to_string()));
}

#[test]
fn silence_is_tolerated_when_progress_markers_present() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        last_output_time_ms: 0,
        now_ms: 130_000,
        process_runtime_ms: 130_000,
        progress_marker_count: 5,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert!(verdict.is_healthy);
    assert!(!verdict.should_terminate);
}

#[test]
fn waiting_for_input_terminates_even_in_early_phase() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        process_runtime_ms: 2_000,
        now_ms: 2_000,
        is_waiting_for_input: true,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert!(verdict.should_terminate);
    assert_eq!(verdict.reason.as_deref(), Some("awaiting stdin"));
}

#[test]
fn error_flood_terminates() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        error_count: config.max_error_count + 1,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert!(verdict.should_terminate);
    assert_eq!(verdict.reason.as_deref(), Some("error flood"));
}

#[test]
fn error_flood_takes_priority_over_input_wait_is_false_since_input_wait_checked_first() {
    // Rule ordering: input-wait (rule 2) is checked before error-flood (rule 3).
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        error_count: config.max_error_count + 1,
        is_waiting_for_input: true,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert_eq!(verdict.reason.as_deref(), Some("awaiting stdin"));
}

#[test]
fn high_cpu_and_memory_both_warn_as_single_entry() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        cpu_percent: 95.0,
        memory_mb: 2000.0,
        output_rate: 10.0,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert!(verdict.is_healthy);
    assert_eq!(verdict.warnings, vec!["High CPU/memory".to_string()]);
}

/// §9 design note: multiple warning predicates can fire simultaneously and
/// both must be present (a multiset, not a single string).
#[test]
fn high_resource_and_low_output_both_warn() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = ProcessMetrics {
        cpu_percent: 95.0,
        memory_mb: 100.0,
        output_rate: 0.0,
        process_runtime_ms: 70_000,
        now_ms: 70_000,
        last_output_time_ms: 70_000,
        ..base_metrics()
    };
    let verdict = analyzer.analyze(&metrics, &config);
    assert!(verdict.is_healthy);
    assert_eq!(verdict.warnings.len(), 2);
    assert!(verdict.warnings.contains(&"High CPU/memory".to_string()));
    assert!(verdict.warnings.contains(&"Low output rate".to_string()));
}

#[test]
fn analyzer_is_deterministic_pure_function() {
    let analyzer = HealthAnalyzer::new();
    let config = HealthAnalysisConfig::default();
    let metrics = base_metrics();
    let a = analyzer.analyze(&metrics, &config);
    let b = analyzer.analyze(&metrics, &config);
    assert_eq!(a, b);
}

#[test]
fn detect_input_wait_matches_common_prompts() {
    assert!(detect_input_wait("Press any key to continue..."));
    assert!(detect_input_wait("Proceed? (y/n)"));
    assert!(detect_input_wait("Overwrite file? [y/N]"));
    assert!(!detect_input_wait("Generating test 3/10..."));
}

#[test]
fn detect_progress_markers_counts_matches_across_patterns() {
    let patterns = default_progress_patterns();
    let count = detect_progress_markers("analyzing file, 42%, step 3, task 2/5", &patterns);
    assert!(count >= 4);
}

#[test]
fn calculate_output_rate_counts_lines_within_window() {
    let mut entries = VecDeque::new();
    entries.push_back(OutputEntry {
        timestamp_ms: 0,
        content: "line one\nline two".to_string(),
    });
    entries.push_back(OutputEntry {
        timestamp_ms: 30_000,
        content: "line three".to_string(),
    });
    entries.push_back(OutputEntry {
        timestamp_ms: 200_000,
        content: "too old".to_string(),
    });
    let rate = calculate_output_rate(&entries, 60_000, 60_000);
    // 3 lines within the last 60s window out of 1 minute -> 3.0 lines/min
    assert_eq!(rate, 3.0);
}

#[test]
fn calculate_output_rate_zero_window_is_zero() {
    let entries = VecDeque::new();
    assert_eq!(calculate_output_rate(&entries, 1000, 0), 0.0);
}
