// src/orchestrator/orchestrator.rs
// Task Orchestrator (§4.6): bounded-concurrency pool with retries,
// exponential backoff, circuit breaking, model fallback, cost tracking,
// per-task timeouts, and progress events. Grounded in the teacher's
// `background/slow_lane.rs` worker-loop shape and `llm/http_client.rs`
// retry/backoff pattern, generalized from an HTTP request to a subprocess
// spawn.

use crate::error::{OrchestratorError, Result};
use crate::health::HealthAnalysisConfig;
use crate::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use crate::orchestrator::ai_cli::{self, CliExit};
use crate::orchestrator::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::orchestrator::pricing;
use crate::orchestrator::recursion_guard::{RecursionGuard, RefusalReason};
use crate::orchestrator::task::{Batch, FailureReason, OrchestratorStats, ProcessResult, Task};
use crate::process_monitor::ProcessMonitor;
use crate::timer::TimerService;
use rand::Rng;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, oneshot, Semaphore};
use tracing::warn;

/// Heartbeat check interval, per §6 external-interface defaults.
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;
/// Absolute per-task deadline, per §6.
pub const DEFAULT_TIMEOUT_MS: u64 = 900_000;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent: usize,
    pub model: String,
    pub fallback_model: Option<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub exponential_backoff: bool,
    pub max_retry_delay_ms: u64,
    pub circuit_breaker_enabled: bool,
    pub circuit_breaker_threshold: u32,
    pub graceful_degradation: bool,
    pub verbose: bool,
    pub ai_cli_bin: String,
    pub tool_install_path: PathBuf,
    pub max_process_count: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            model: "sonnet".to_string(),
            fallback_model: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: 2,
            exponential_backoff: true,
            max_retry_delay_ms: 30_000,
            circuit_breaker_enabled: true,
            circuit_breaker_threshold: 5,
            graceful_degradation: false,
            verbose: false,
            ai_cli_bin: ai_cli::AI_CLI_BIN.to_string(),
            tool_install_path: PathBuf::from("."),
            max_process_count: 64,
        }
    }
}

/// Progress/lifecycle events emitted during `process_batch` (spec §6 "Events surface").
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    TaskStart { task_id: String },
    TaskComplete { task_id: String, success: bool },
    TaskRetry { task_id: String, attempt: u32, delay_ms: u64 },
    TaskFail { task_id: String, reason: String },
    BatchProgress { completed: usize, total: usize },
}

struct StatsInner {
    queued: usize,
    running: usize,
    succeeded: usize,
    failed: usize,
    cumulative_cost: f64,
    cumulative_tokens: u64,
    cumulative_duration_ms: u64,
}

impl Default for StatsInner {
    fn default() -> Self {
        Self {
            queued: 0,
            running: 0,
            succeeded: 0,
            failed: 0,
            cumulative_cost: 0.0,
            cumulative_tokens: 0,
            cumulative_duration_ms: 0,
        }
    }
}

/// Central scheduler for AI task execution.
pub struct TaskOrchestrator {
    config: OrchestratorConfig,
    timer: Arc<dyn TimerService>,
    heartbeat: Arc<HeartbeatMonitor>,
    circuit_breaker: CircuitBreaker,
    recursion_guard: RecursionGuard,
    stats: Mutex<StatsInner>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl TaskOrchestrator {
    pub fn new(config: OrchestratorConfig, timer: Arc<dyn TimerService>, process_monitor: Arc<dyn ProcessMonitor>) -> Self {
        let threshold = if config.circuit_breaker_enabled {
            config.circuit_breaker_threshold
        } else {
            0 // 0 means "never trips" per CircuitBreaker::record_failure guard
        };
        let recursion_guard = RecursionGuard::new(config.tool_install_path.clone(), config.max_process_count);
        let heartbeat = Arc::new(HeartbeatMonitor::new(
            timer.clone(),
            process_monitor,
            HealthAnalysisConfig::default(),
        ));
        let (events, _rx) = broadcast::channel(1024);
        Self {
            config,
            timer,
            heartbeat,
            circuit_breaker: CircuitBreaker::new(threshold),
            recursion_guard,
            stats: Mutex::new(StatsInner::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.events.send(event);
    }

    pub fn get_stats(&self) -> OrchestratorStats {
        let inner = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        OrchestratorStats {
            queued: inner.queued,
            running: inner.running,
            succeeded: inner.succeeded,
            failed: inner.failed,
            cumulative_cost: inner.cumulative_cost,
            cumulative_tokens: inner.cumulative_tokens,
            cumulative_duration_ms: inner.cumulative_duration_ms,
            circuit_breaker_state: match self.circuit_breaker.state() {
                CircuitState::Closed => "closed".to_string(),
                CircuitState::Open => "open".to_string(),
                CircuitState::HalfOpen => "half-open".to_string(),
            },
        }
    }

    /// Process one batch to completion, returning results in the original
    /// task-submission order (spec §4.6, O3). Never throws except for the
    /// Recursion Guard's fatal startup refusal.
    pub async fn process_batch(self: &Arc<Self>, batch: &Batch, target: &std::path::Path) -> Result<Vec<ProcessResult>> {
        self.circuit_breaker.begin_batch();

        if let Err(reason) = self.recursion_guard.check_startup(target) {
            warn!(reason = reason.as_str(), "recursion guard refused batch at startup");
            let results: Vec<ProcessResult> = batch
                .tasks
                .iter()
                .map(|t| ProcessResult::failure(t, map_refusal(reason), 0, 0))
                .collect();
            return Ok(results);
        }

        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.queued += batch.tasks.len();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let total = batch.tasks.len();

        let mut handles = Vec::with_capacity(total);
        for task in &batch.tasks {
            let task = task.clone();
            let semaphore = semaphore.clone();
            let target = target.to_path_buf();
            let orchestrator = self.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.run_task(task, target, semaphore).await
            }));
        }

        let mut results = Vec::with_capacity(total);
        for (idx, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    warn!(task_id = %batch.tasks[idx].id, error = %join_err, "task join failed");
                    ProcessResult::failure(&batch.tasks[idx], FailureReason::Cancelled, 0, 0)
                }
            };
            self.record_result(&result);
            self.emit(OrchestratorEvent::BatchProgress {
                completed: idx + 1,
                total,
            });
            results.push(result);
        }

        Ok(results)
    }

    fn record_result(&self, result: &ProcessResult) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.queued = stats.queued.saturating_sub(1);
        if result.success {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
        stats.cumulative_cost += result.actual_cost;
        stats.cumulative_tokens += result.input_tokens + result.output_tokens;
        stats.cumulative_duration_ms += result.duration_ms;
    }

    async fn run_task(&self, task: Task, target: PathBuf, semaphore: Arc<Semaphore>) -> ProcessResult {
        let start = self.timer.now_ms();
        let mut model = task.model.clone();
        let mut attempt = 0u32;

        loop {
            if !self.circuit_breaker.is_admitting() {
                self.emit(OrchestratorEvent::TaskFail {
                    task_id: task.id.clone(),
                    reason: "circuit-open".to_string(),
                });
                return ProcessResult::failure(&task, FailureReason::CircuitOpen, attempt, self.elapsed(start));
            }

            if let Err(reason) = self.recursion_guard.check_spawn(&target) {
                return ProcessResult::failure(&task, map_refusal(reason), attempt, self.elapsed(start));
            }

            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return ProcessResult::failure(&task, FailureReason::Cancelled, attempt, self.elapsed(start));
                }
            };

            self.emit(OrchestratorEvent::TaskStart {
                task_id: task.id.clone(),
            });
            {
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.running += 1;
            }

            self.recursion_guard.note_spawned();
            let outcome = self.attempt_once(&task, &model).await;
            self.recursion_guard.note_exited();

            {
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.running = stats.running.saturating_sub(1);
            }

            match outcome {
                Ok(mut result) => {
                    result.duration_ms = self.elapsed(start);
                    result.retries_consumed = attempt;
                    self.circuit_breaker.record_success();
                    self.emit(OrchestratorEvent::TaskComplete {
                        task_id: task.id.clone(),
                        success: true,
                    });
                    return result;
                }
                Err(reason) => {
                    self.circuit_breaker.record_failure();

                    if reason.is_retryable() && attempt < self.config.max_retries {
                        let next_attempt = attempt + 1;
                        let delay = self.retry_delay(attempt);

                        if next_attempt == self.config.max_retries {
                            if let Some(fallback) = &self.config.fallback_model {
                                model = fallback.clone();
                            }
                        }

                        self.emit(OrchestratorEvent::TaskRetry {
                            task_id: task.id.clone(),
                            attempt: next_attempt,
                            delay_ms: delay,
                        });
                        self.sleep(delay).await;
                        attempt = next_attempt;
                        continue;
                    }

                    self.emit(OrchestratorEvent::TaskFail {
                        task_id: task.id.clone(),
                        reason: format!("{reason:?}"),
                    });

                    if self.config.graceful_degradation && reason != FailureReason::Budget {
                        return ProcessResult::degraded(&task, reason, attempt, self.elapsed(start));
                    }
                    return ProcessResult::failure(&task, reason, attempt, self.elapsed(start));
                }
            }
        }
    }

    fn elapsed(&self, start_ms: u64) -> u64 {
        self.timer.now_ms().saturating_sub(start_ms)
    }

    fn retry_delay(&self, attempt: u32) -> u64 {
        if !self.config.exponential_backoff {
            return self.config.max_retry_delay_ms.min(1_000);
        }
        let base: u64 = 1_000;
        let exp = base.saturating_mul(1u64 << attempt.min(16));
        let jitter = rand::rng().random_range(0.0..0.25);
        let with_jitter = (exp as f64 * (1.0 + jitter)) as u64;
        with_jitter.min(self.config.max_retry_delay_ms)
    }

    async fn sleep(&self, delay_ms: u64) {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let _handle = self.timer.schedule(
            delay_ms,
            Box::new(move || {
                if let Some(tx) = tx.lock().unwrap_or_else(|e| e.into_inner()).take() {
                    let _ = tx.send(());
                }
                Box::pin(async {})
            }),
        );
        let _ = rx.await;
    }

    /// One spawn-attach-wait attempt for a task. Returns the final retryable
    /// classification on failure (spec §4.6 steps 4-6).
    async fn attempt_once(&self, task: &Task, model: &str) -> std::result::Result<ProcessResult, FailureReason> {
        let spawn_result = ai_cli::spawn(&self.config.ai_cli_bin, &task.prompt, model);
        let (control, streams, mut exit_rx) = match spawn_result {
            Ok(triple) => triple,
            Err(OrchestratorError::Other(msg)) if msg == "CLI unavailable" => {
                return Err(FailureReason::CliUnavailable);
            }
            Err(_) => return Err(FailureReason::TransientCli),
        };

        let control = Arc::new(control);
        let pid = control.pid();
        let mut heartbeat_events = self.heartbeat.subscribe();

        self.heartbeat
            .start_monitoring(
                task.id.clone(),
                pid,
                control.clone(),
                streams,
                DEFAULT_INTERVAL_MS,
                Some(self.config.timeout_ms),
            )
            .await;

        let outcome = loop {
            tokio::select! {
                exit = exit_rx.recv() => {
                    match exit {
                        Some(CliExit::Success(output)) => {
                            break Ok(output);
                        }
                        Some(CliExit::NonZeroExit { .. }) => break Err(FailureReason::TransientCli),
                        Some(CliExit::InvalidJson(_)) => break Err(FailureReason::TransientCli),
                        None => break Err(FailureReason::TransientCli),
                    }
                }
                event = heartbeat_events.recv() => {
                    if let Ok(HeartbeatEvent::Terminated { task_id, reason }) = event {
                        if task_id == task.id {
                            break Err(if reason == "timeout" {
                                FailureReason::Timeout
                            } else {
                                FailureReason::HealthTermination
                            });
                        }
                    }
                }
            }
        };

        self.heartbeat.stop_monitoring(&task.id).await;

        match outcome {
            Ok(output) => {
                if let Err(err) = persist_artifact(&task.test_file, &output.content).await {
                    warn!(task_id = %task.id, error = %err, "failed to persist generated test file");
                    return Err(FailureReason::TransientCli);
                }

                let pricing = pricing::get_pricing(model);
                let cost = pricing.calculate_cost(output.usage.input_tokens, output.usage.output_tokens);
                Ok(ProcessResult {
                    task_id: task.id.clone(),
                    success: true,
                    content: Some(output.content),
                    input_tokens: output.usage.input_tokens,
                    output_tokens: output.usage.output_tokens,
                    actual_cost: cost,
                    duration_ms: 0,
                    error_reason: None,
                    retries_consumed: 0,
                    model_used: model.to_string(),
                    degraded: false,
                })
            }
            Err(reason) => Err(reason),
        }
    }
}

/// Whole-file write of generated test content to its output path, creating
/// parent directories as needed (spec §4.6 step 5, §6 "Generated artifact layout").
async fn persist_artifact(test_file: &std::path::Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = test_file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(test_file, content).await
}

fn map_refusal(reason: RefusalReason) -> FailureReason {
    match reason {
        RefusalReason::SelfTarget => FailureReason::SelfTarget,
        RefusalReason::AgentsDisabled => FailureReason::AgentsDisabled,
        RefusalReason::ProcessLimit => FailureReason::ProcessLimit,
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
