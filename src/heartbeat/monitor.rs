// src/heartbeat/monitor.rs
// Heartbeat Monitor: facade combining the Scheduler, the Health Analyzer, and
// the Process Monitor. Attaches to a child's stdout/stderr, aggregates
// output/error/progress, drives the analyzer each tick, emits events, and
// terminates the child on an unfavorable verdict (spec §4.5).

use crate::health::{
    calculate_output_rate, detect_input_wait, detect_progress_markers, HealthAnalysisConfig,
    HealthAnalyzer, HealthVerdict, OutputEntry, ProcessMetrics,
};
use crate::heartbeat::scheduler::{HeartbeatScheduler, TaskId};
use crate::process_monitor::ProcessMonitor;
use crate::timer::TimerService;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

/// How many stdout/stderr entries are retained per monitored process
/// (spec §3 MonitoredProcess: "retain last ~500 entries").
pub const RING_BUFFER_CAP: usize = 500;

/// Grace period between the graceful-stop signal and the force-kill signal.
pub const GRACE_PERIOD_MS: u64 = 5_000;

/// Events emitted by the Heartbeat Monitor for external observability
/// (spec §6 "Events surface").
#[derive(Debug, Clone)]
pub enum HeartbeatEvent {
    Progress { task_id: TaskId },
    Warning { task_id: TaskId, warnings: Vec<String> },
    Unhealthy { task_id: TaskId, verdict: HealthVerdict },
    HealthCheck { task_id: TaskId, verdict: HealthVerdict },
    Terminated { task_id: TaskId, reason: String },
    Error { task_id: TaskId, message: String },
}

/// Legacy event vocabulary mapped deterministically from `HeartbeatEvent` for
/// an older orchestrator surface (spec §4.5 "Backward-compatibility adapter").
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyEvent {
    ProcessDead { task_id: TaskId },
    ProcessSlow { task_id: TaskId, is_early_phase: bool },
    ProcessHighResource { task_id: TaskId },
    ProcessProgress { task_id: TaskId },
}

/// Map one internal event into zero or more legacy events. Pure and
/// deterministic so it can be unit tested without a running monitor.
pub fn to_legacy_events(event: &HeartbeatEvent) -> Vec<LegacyEvent> {
    match event {
        HeartbeatEvent::Progress { task_id } => vec![LegacyEvent::ProcessProgress {
            task_id: task_id.clone(),
        }],
        HeartbeatEvent::Unhealthy { task_id, verdict } if verdict.should_terminate => {
            vec![LegacyEvent::ProcessDead {
                task_id: task_id.clone(),
            }]
        }
        HeartbeatEvent::Warning { task_id, warnings } => {
            let mut out = Vec::new();
            for w in warnings {
                if w.contains("High CPU/memory") {
                    out.push(LegacyEvent::ProcessHighResource {
                        task_id: task_id.clone(),
                    });
                } else if w.contains("Low output rate") {
                    out.push(LegacyEvent::ProcessSlow {
                        task_id: task_id.clone(),
                        is_early_phase: w.contains("early phase"),
                    });
                }
            }
            out
        }
        _ => Vec::new(),
    }
}

/// Control surface for signalling a running child; decoupled from any
/// particular process-spawning implementation so the monitor is testable
/// without a real subprocess.
#[async_trait]
pub trait ChildControl: Send + Sync {
    async fn signal_stop(&self);
    async fn force_kill(&self);
}

/// Streams the caller attaches at `start_monitoring` time. Produced by
/// whatever spawned the child (see `orchestrator::ai_cli`).
pub struct ChildStreams {
    pub stdout_lines: mpsc::Receiver<String>,
    pub stderr_lines: mpsc::Receiver<String>,
}

/// Owned exclusively by the Heartbeat Monitor (spec §3 ownership rules).
pub struct MonitoredProcess {
    pub task_id: TaskId,
    pub pid: u32,
    pub started_at_ms: u64,
    pub stdout: VecDeque<OutputEntry>,
    pub stderr: VecDeque<OutputEntry>,
    pub progress_marker_count: u32,
    pub error_count: u32,
    pub last_output_time_ms: u64,
    pub last_health_check_ms: Option<u64>,
    pub last_verdict: Option<HealthVerdict>,
    pub termination_requested: bool,
}

impl MonitoredProcess {
    fn new(task_id: TaskId, pid: u32, started_at_ms: u64) -> Self {
        Self {
            task_id,
            pid,
            started_at_ms,
            stdout: VecDeque::with_capacity(RING_BUFFER_CAP),
            stderr: VecDeque::with_capacity(RING_BUFFER_CAP),
            progress_marker_count: 0,
            error_count: 0,
            last_output_time_ms: started_at_ms,
            last_health_check_ms: None,
            last_verdict: None,
            termination_requested: false,
        }
    }

    fn tail_text(&self, max_entries: usize) -> String {
        self.stdout
            .iter()
            .rev()
            .take(max_entries)
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn push_bounded(buffer: &mut VecDeque<OutputEntry>, entry: OutputEntry) {
    buffer.push_back(entry);
    while buffer.len() > RING_BUFFER_CAP {
        buffer.pop_front();
    }
}

struct ProcessState {
    process: MonitoredProcess,
    control: Arc<dyn ChildControl>,
}

/// Facade combining the Heartbeat Scheduler, the Health Analyzer, and a
/// Process Monitor. One instance is shared across all tasks in a run.
pub struct HeartbeatMonitor {
    scheduler: Arc<HeartbeatScheduler>,
    analyzer: HealthAnalyzer,
    process_monitor: Arc<dyn ProcessMonitor>,
    timer: Arc<dyn TimerService>,
    config: HealthAnalysisConfig,
    processes: Arc<Mutex<HashMap<TaskId, ProcessState>>>,
    events: broadcast::Sender<HeartbeatEvent>,
}

impl HeartbeatMonitor {
    pub fn new(
        timer: Arc<dyn TimerService>,
        process_monitor: Arc<dyn ProcessMonitor>,
        config: HealthAnalysisConfig,
    ) -> Self {
        let (events, _rx) = broadcast::channel(1024);
        Self {
            scheduler: Arc::new(HeartbeatScheduler::new(timer.clone())),
            analyzer: HealthAnalyzer::new(),
            process_monitor,
            timer,
            config,
            processes: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: HeartbeatEvent) {
        let _ = self.events.send(event);
    }

    /// Attach to a child process's output streams, start the reader tasks,
    /// and schedule the periodic health check. `timeout_ms`, if given,
    /// schedules an absolute kill deadline independent of the health checks.
    pub async fn start_monitoring(
        &self,
        task_id: TaskId,
        pid: u32,
        control: Arc<dyn ChildControl>,
        streams: ChildStreams,
        interval_ms: u64,
        timeout_ms: Option<u64>,
    ) {
        let started_at_ms = self.timer.now_ms();
        let process = MonitoredProcess::new(task_id.clone(), pid, started_at_ms);
        self.processes.lock().await.insert(
            task_id.clone(),
            ProcessState {
                process,
                control: control.clone(),
            },
        );

        self.spawn_stdout_reader(task_id.clone(), streams.stdout_lines);
        self.spawn_stderr_reader(task_id.clone(), streams.stderr_lines);

        let tick_monitor = self.clone_inner();
        let tick_task_id = task_id.clone();
        self.scheduler
            .schedule_checks(&task_id, interval_ms, move || {
                let monitor = tick_monitor.clone();
                let task_id = tick_task_id.clone();
                async move {
                    monitor.tick(&task_id).await;
                }
            })
            .await;

        if let Some(timeout_ms) = timeout_ms {
            let kill_monitor = self.clone_inner();
            let kill_task_id = task_id.clone();
            self.scheduler
                .schedule_timeout(&task_id, timeout_ms, move || {
                    let monitor = kill_monitor.clone();
                    let task_id = kill_task_id.clone();
                    async move {
                        monitor.terminate(&task_id, "timeout").await;
                    }
                })
                .await;
        }
    }

    /// Cheap clone of the parts needed inside timer callbacks (all are Arcs).
    fn clone_inner(&self) -> Arc<HeartbeatMonitorInner> {
        Arc::new(HeartbeatMonitorInner {
            scheduler: self.scheduler.clone(),
            analyzer: self.analyzer.clone(),
            process_monitor: self.process_monitor.clone(),
            timer: self.timer.clone(),
            config: self.config.clone(),
            processes: self.processes.clone(),
            events: self.events.clone(),
        })
    }

    fn spawn_stdout_reader(&self, task_id: TaskId, mut rx: mpsc::Receiver<String>) {
        let processes = self.processes.clone();
        let events = self.events.clone();
        let config = self.config.clone();
        let timer = self.timer.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let mut guard = processes.lock().await;
                let Some(state) = guard.get_mut(&task_id) else {
                    break;
                };
                let now = timer.now_ms();
                let markers = detect_progress_markers(&line, &config.progress_marker_patterns);
                push_bounded(
                    &mut state.process.stdout,
                    OutputEntry {
                        timestamp_ms: now,
                        content: line,
                    },
                );
                state.process.last_output_time_ms = now;
                if markers > 0 {
                    state.process.progress_marker_count += markers;
                    drop(guard);
                    let _ = events.send(HeartbeatEvent::Progress {
                        task_id: task_id.clone(),
                    });
                }
            }
        });
    }

    fn spawn_stderr_reader(&self, task_id: TaskId, mut rx: mpsc::Receiver<String>) {
        let processes = self.processes.clone();
        let timer = self.timer.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let mut guard = processes.lock().await;
                let Some(state) = guard.get_mut(&task_id) else {
                    break;
                };
                let now = timer.now_ms();
                push_bounded(
                    &mut state.process.stderr,
                    OutputEntry {
                        timestamp_ms: now,
                        content: line,
                    },
                );
                state.process.error_count += 1;
            }
        });
    }

    /// `stopMonitoring`: cancel all timers and detach bookkeeping for a task.
    /// Idempotent (Testable Properties §8 "Idempotent stop").
    pub async fn stop_monitoring(&self, task_id: &TaskId) {
        self.scheduler.cancel_all(task_id).await;
        self.processes.lock().await.remove(task_id);
    }

    pub async fn terminate(&self, task_id: &TaskId, reason: &str) {
        self.clone_inner().terminate(task_id, reason).await;
    }

    pub async fn tick(&self, task_id: &TaskId) {
        self.clone_inner().tick(task_id).await;
    }
}

/// Arc-friendly inner struct so timer callbacks (which must be `'static`)
/// can hold onto what they need without borrowing `HeartbeatMonitor` itself.
struct HeartbeatMonitorInner {
    scheduler: Arc<HeartbeatScheduler>,
    analyzer: HealthAnalyzer,
    process_monitor: Arc<dyn ProcessMonitor>,
    timer: Arc<dyn TimerService>,
    config: HealthAnalysisConfig,
    processes: Arc<Mutex<HashMap<TaskId, ProcessState>>>,
    events: broadcast::Sender<HeartbeatEvent>,
}

impl HeartbeatMonitorInner {
    async fn tick(self: &Arc<Self>, task_id: &TaskId) {
        // Any exception inside a tick is caught and emitted, never propagated
        // (spec §4.5 "Error handling").
        if let Err(err) = self.tick_inner(task_id).await {
            let _ = self.events.send(HeartbeatEvent::Error {
                task_id: task_id.clone(),
                message: err,
            });
        }
    }

    async fn tick_inner(self: &Arc<Self>, task_id: &TaskId) -> Result<(), String> {
        let now = self.timer.now_ms();
        let usage = {
            let guard = self.processes.lock().await;
            let Some(state) = guard.get(task_id) else {
                return Ok(()); // stopped concurrently; nothing to do
            };
            state.process.pid
        };
        let usage = self.process_monitor.get_resource_usage(usage).await;

        let (metrics, should_skip) = {
            let mut guard = self.processes.lock().await;
            let Some(state) = guard.get_mut(task_id) else {
                return Ok(());
            };
            let process = &mut state.process;
            let output_rate = calculate_output_rate(&process.stdout, now, self.config.analysis_window_ms);
            let is_waiting = detect_input_wait(&process.tail_text(20));
            let metrics = ProcessMetrics {
                cpu_percent: usage.map(|u| u.cpu_percent).unwrap_or(0.0),
                memory_mb: usage.map(|u| u.memory_mb).unwrap_or(0.0),
                output_rate,
                last_output_time_ms: process.last_output_time_ms,
                error_count: process.error_count,
                process_runtime_ms: now.saturating_sub(process.started_at_ms),
                progress_marker_count: process.progress_marker_count,
                is_waiting_for_input: is_waiting,
                now_ms: now,
            };
            process.last_health_check_ms = Some(now);
            (metrics, false)
        };
        let _ = should_skip;

        let verdict = self.analyzer.analyze(&metrics, &self.config);

        {
            let mut guard = self.processes.lock().await;
            if let Some(state) = guard.get_mut(task_id) {
                state.process.last_verdict = Some(verdict.clone());
            }
        }

        let _ = self.events.send(HeartbeatEvent::HealthCheck {
            task_id: task_id.clone(),
            verdict: verdict.clone(),
        });

        if !verdict.is_healthy {
            let _ = self.events.send(HeartbeatEvent::Unhealthy {
                task_id: task_id.clone(),
                verdict: verdict.clone(),
            });
        }

        if !verdict.warnings.is_empty() {
            let _ = self.events.send(HeartbeatEvent::Warning {
                task_id: task_id.clone(),
                warnings: verdict.warnings.clone(),
            });
        }

        if verdict.should_terminate {
            let already_requested = {
                let guard = self.processes.lock().await;
                guard
                    .get(task_id)
                    .map(|s| s.process.termination_requested)
                    .unwrap_or(true)
            };
            if !already_requested {
                let reason = verdict.reason.clone().unwrap_or_else(|| "unhealthy".to_string());
                self.initiate_termination(task_id, &reason).await;
            }
        }

        Ok(())
    }

    async fn initiate_termination(self: &Arc<Self>, task_id: &TaskId, reason: &str) {
        let control = {
            let mut guard = self.processes.lock().await;
            let Some(state) = guard.get_mut(task_id) else {
                return;
            };
            state.process.termination_requested = true;
            state.control.clone()
        };

        control.signal_stop().await;

        // Grace period owned by the Scheduler so cancellation is unified
        // with the other per-task timers (spec §4.5 "Termination protocol").
        let inner = self.clone();
        let kill_task_id = task_id.clone();
        self.scheduler
            .schedule_timeout(task_id, GRACE_PERIOD_MS, move || {
                let inner = inner.clone();
                let task_id = kill_task_id.clone();
                async move {
                    let control = {
                        let guard = inner.processes.lock().await;
                        guard.get(&task_id).map(|s| s.control.clone())
                    };
                    if let Some(control) = control {
                        control.force_kill().await;
                    }
                }
            })
            .await;

        let _ = self.events.send(HeartbeatEvent::Terminated {
            task_id: task_id.clone(),
            reason: reason.to_string(),
        });
    }

    async fn terminate(self: &Arc<Self>, task_id: &TaskId, reason: &str) {
        let already_requested = {
            let guard = self.processes.lock().await;
            guard
                .get(task_id)
                .map(|s| s.process.termination_requested)
                .unwrap_or(true)
        };
        if !already_requested {
            self.initiate_termination(task_id, reason).await;
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
