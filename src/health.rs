// src/health.rs
// Health Analyzer: a pure, stateless function from ProcessMetrics + policy to
// a HealthVerdict. Grounded in the teacher's `llm/circuit_breaker.rs` state
// modeling (explicit enum states, deterministic transitions, unit tests that
// construct the input directly rather than driving real time).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// One ring-buffer entry of captured process output.
#[derive(Debug, Clone)]
pub struct OutputEntry {
    pub timestamp_ms: u64,
    pub content: String,
}

/// Per-tick snapshot fed to the analyzer.
#[derive(Debug, Clone)]
pub struct ProcessMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f32,
    /// Output rate in lines/minute over the analysis window.
    pub output_rate: f64,
    /// Milliseconds since epoch/start-of-run of the last stdout byte seen.
    pub last_output_time_ms: u64,
    pub error_count: u32,
    pub process_runtime_ms: u64,
    pub progress_marker_count: u32,
    pub is_waiting_for_input: bool,
    /// Current virtual/wall clock, used to compute silence duration.
    pub now_ms: u64,
}

/// Tunable thresholds driving the analyzer. Defaults per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthAnalysisConfig {
    pub cpu_threshold: f32,
    pub memory_threshold_mb: f32,
    pub min_output_rate: f64,
    pub max_silence_duration_ms: u64,
    pub max_error_count: u32,
    pub progress_marker_patterns: Vec<String>,
    pub min_progress_markers: u32,
    pub analysis_window_ms: u64,
}

/// Milliseconds of runtime below which silence-based termination is suppressed.
pub const EARLY_PHASE_MS: u64 = 60_000;

impl Default for HealthAnalysisConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold_mb: 1000.0,
            min_output_rate: 0.1,
            max_silence_duration_ms: 120_000,
            max_error_count: 50,
            progress_marker_patterns: default_progress_patterns(),
            min_progress_markers: 1,
            analysis_window_ms: 60_000,
        }
    }
}

pub fn default_progress_patterns() -> Vec<String> {
    [
        "analyzing",
        "processing",
        "generating",
        "writing",
        "completed",
        "done",
        "finished",
        r"\d+%",
        r"step \d+",
        r"phase \d+",
        r"task \d+/\d+",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Categorical verdict for one health tick. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub is_healthy: bool,
    pub should_terminate: bool,
    pub warnings: Vec<String>,
    pub reason: Option<String>,
    /// Whether this tick occurred during the 60s early phase (informational).
    pub is_early_phase: bool,
}

impl HealthVerdict {
    fn healthy(is_early_phase: bool) -> Self {
        Self {
            is_healthy: true,
            should_terminate: false,
            warnings: Vec::new(),
            reason: None,
            is_early_phase,
        }
    }
}

/// Input-prompt detection patterns — common interactive CLI prompts.
fn input_wait_patterns() -> &'static [&'static str] {
    &[
        "press any key",
        "(y/n)",
        "(Y/n)",
        "[y/N]",
        "continue? ",
        "do you want to continue",
        "password:",
    ]
}

/// Pure function: classify a tail of text as "waiting for interactive input".
pub fn detect_input_wait(tail_text: &str) -> bool {
    let lower = tail_text.to_lowercase();
    input_wait_patterns()
        .iter()
        .any(|p| lower.contains(&p.to_lowercase()))
}

/// Pure function: count regex matches of `patterns` anywhere in `text`.
/// Invalid patterns are skipped (never panics on bad user-supplied regex).
pub fn detect_progress_markers(text: &str, patterns: &[String]) -> u32 {
    patterns
        .iter()
        .filter_map(|p| Regex::new(&format!("(?i){p}")).ok())
        .map(|re| re.find_iter(text).count() as u32)
        .sum()
}

/// Pure function: lines/minute over entries falling within `window_ms` of `now_ms`.
pub fn calculate_output_rate(entries: &VecDeque<OutputEntry>, now_ms: u64, window_ms: u64) -> f64 {
    if window_ms == 0 {
        return 0.0;
    }
    let window_start = now_ms.saturating_sub(window_ms);
    let count = entries
        .iter()
        .filter(|e| e.timestamp_ms >= window_start && e.timestamp_ms <= now_ms)
        .map(|e| e.content.lines().count().max(1))
        .sum::<usize>();
    let minutes = Duration::from_millis(window_ms).as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        0.0
    } else {
        count as f64 / minutes
    }
}

/// Pure, stateless health analyzer. Same inputs always produce the same
/// verdict (Testable Properties §8 "Analyzer determinism").
#[derive(Debug, Clone, Default)]
pub struct HealthAnalyzer;

impl HealthAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one tick. Rules are applied in the order given in spec §4.3.
    pub fn analyze(&self, metrics: &ProcessMetrics, config: &HealthAnalysisConfig) -> HealthVerdict {
        let is_early_phase = metrics.process_runtime_ms < EARLY_PHASE_MS;
        let silence_ms = metrics.now_ms.saturating_sub(metrics.last_output_time_ms);

        // Rule 1: silent and stuck.
        if silence_ms > config.max_silence_duration_ms
            && metrics.progress_marker_count < config.min_progress_markers
            && metrics.process_runtime_ms > EARLY_PHASE_MS
        {
            return HealthVerdict {
                is_healthy: false,
                should_terminate: true,
                warnings: Vec::new(),
                reason: Some("silent".to_string()),
                is_early_phase,
            };
        }

        // Rule 2: waiting for stdin.
        if metrics.is_waiting_for_input {
            return HealthVerdict {
                is_healthy: false,
                should_terminate: true,
                warnings: Vec::new(),
                reason: Some("awaiting stdin".to_string()),
                is_early_phase,
            };
        }

        // Rule 3: error flood.
        if metrics.error_count > config.max_error_count {
            return HealthVerdict {
                is_healthy: false,
                should_terminate: true,
                warnings: Vec::new(),
                reason: Some("error flood".to_string()),
                is_early_phase,
            };
        }

        let mut verdict = HealthVerdict::healthy(is_early_phase);

        // Rule 4 and 5 are independent warnings — both may fire (§9 design note:
        // warnings are a multiset, not a single string).
        if metrics.cpu_percent > config.cpu_threshold || metrics.memory_mb > config.memory_threshold_mb {
            verdict.warnings.push("High CPU/memory".to_string());
        }

        if metrics.output_rate < config.min_output_rate {
            if is_early_phase {
                verdict.warnings.push("Low output rate (early phase)".to_string());
            } else {
                verdict.warnings.push("Low output rate".to_string());
            }
        }

        verdict
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
