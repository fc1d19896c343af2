// src/heartbeat/scheduler.rs
// Heartbeat Scheduler: per-task registries of periodic health-check handles,
// one-shot timeout handles, and progress-reporting interval handles, all
// backed by the injected Timer Service (spec §4.4).

use crate::timer::{TimerCallback, TimerHandle, TimerService};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub active_checks: usize,
    pub active_timeouts: usize,
    pub active_progress_reporters: usize,
}

/// Per-task timer registry. Re-scheduling for the same task id atomically
/// cancels the prior handle before installing the new one, so no timer ever
/// leaks (spec invariant I5 / §9 "avoid retaining dead task ids").
pub struct HeartbeatScheduler {
    timer: Arc<dyn TimerService>,
    checks: Mutex<HashMap<TaskId, Arc<dyn TimerHandle>>>,
    timeouts: Mutex<HashMap<TaskId, Arc<dyn TimerHandle>>>,
    progress: Mutex<HashMap<TaskId, Arc<dyn TimerHandle>>>,
}

fn boxed<F, Fut>(mut f: F) -> TimerCallback
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

impl HeartbeatScheduler {
    pub fn new(timer: Arc<dyn TimerService>) -> Self {
        Self {
            timer,
            checks: Mutex::new(HashMap::new()),
            timeouts: Mutex::new(HashMap::new()),
            progress: Mutex::new(HashMap::new()),
        }
    }

    async fn take(registry: &Mutex<HashMap<TaskId, Arc<dyn TimerHandle>>>, task_id: &TaskId) -> Option<Arc<dyn TimerHandle>> {
        registry.lock().unwrap_or_else(|e| e.into_inner()).remove(task_id)
    }

    async fn install(
        registry: &Mutex<HashMap<TaskId, Arc<dyn TimerHandle>>>,
        task_id: &TaskId,
        handle: Arc<dyn TimerHandle>,
    ) {
        if let Some(prior) = Self::take(registry, task_id).await {
            prior.cancel().await;
        }
        registry.lock().unwrap_or_else(|e| e.into_inner()).insert(task_id.clone(), handle);
    }

    /// Schedule (or atomically re-schedule) the periodic health check for `task_id`.
    pub async fn schedule_checks<F, Fut>(&self, task_id: &TaskId, interval_ms: u64, callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.timer.schedule_interval(interval_ms, boxed(callback));
        Self::install(&self.checks, task_id, handle).await;
    }

    /// Schedule (or atomically re-schedule) a one-shot timeout/deadline for `task_id`.
    pub async fn schedule_timeout<F, Fut>(&self, task_id: &TaskId, delay_ms: u64, callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.timer.schedule(delay_ms, boxed(callback));
        Self::install(&self.timeouts, task_id, handle).await;
    }

    /// Schedule (or atomically re-schedule) periodic progress reporting for `task_id`.
    pub async fn schedule_progress_reporting<F, Fut>(&self, task_id: &TaskId, interval_ms: u64, callback: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.timer.schedule_interval(interval_ms, boxed(callback));
        Self::install(&self.progress, task_id, handle).await;
    }

    pub async fn cancel_check(&self, task_id: &TaskId) {
        if let Some(h) = Self::take(&self.checks, task_id).await {
            h.cancel().await;
        }
    }

    pub async fn cancel_timeout(&self, task_id: &TaskId) {
        if let Some(h) = Self::take(&self.timeouts, task_id).await {
            h.cancel().await;
        }
    }

    pub async fn cancel_progress_reporting(&self, task_id: &TaskId) {
        if let Some(h) = Self::take(&self.progress, task_id).await {
            h.cancel().await;
        }
    }

    /// Cancel every timer registered for `task_id` (check, timeout, progress).
    /// Idempotent: calling this N>=1 times has the same effect as once
    /// (Testable Properties §8 "Idempotent stop" / "No-leak cancellation").
    pub async fn cancel_all(&self, task_id: &TaskId) {
        self.cancel_check(task_id).await;
        self.cancel_timeout(task_id).await;
        self.cancel_progress_reporting(task_id).await;
    }

    /// Cancel every timer for every task currently registered.
    pub async fn cancel_all_tasks(&self) {
        let ids: Vec<TaskId> = {
            let checks = self.checks.lock().unwrap_or_else(|e| e.into_inner());
            let timeouts = self.timeouts.lock().unwrap_or_else(|e| e.into_inner());
            let progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
            checks
                .keys()
                .chain(timeouts.keys())
                .chain(progress.keys())
                .cloned()
                .collect::<std::collections::HashSet<_>>()
                .into_iter()
                .collect()
        };
        for id in ids {
            self.cancel_all(&id).await;
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            active_checks: self.checks.lock().unwrap_or_else(|e| e.into_inner()).len(),
            active_timeouts: self.timeouts.lock().unwrap_or_else(|e| e.into_inner()).len(),
            active_progress_reporters: self.progress.lock().unwrap_or_else(|e| e.into_inner()).len(),
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
