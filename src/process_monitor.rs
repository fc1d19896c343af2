// src/process_monitor.rs
// Process Monitor: probes live OS resource usage (CPU %, RSS MB) by PID.
//
// Modeled on the sysinfo-based sampling in MadGoatHaz-GOATd-Kernel's
// `kernel/audit.rs::get_performance_metrics` (System::new_all + refresh,
// run via spawn_blocking so the async runtime is never stalled by the
// underlying /proc scrape).

use async_trait::async_trait;
use sysinfo::{Pid, System};

/// A single resource-usage sample for one process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f32,
    pub memory_mb: f32,
}

/// Single operation: sample resource usage for a PID. Implementations must
/// swallow failures (process gone, permission denied, platform not
/// supported) and return `None` rather than propagate an error — the Health
/// Analyzer treats `None` as zero.
#[async_trait]
pub trait ProcessMonitor: Send + Sync {
    async fn get_resource_usage(&self, pid: u32) -> Option<ResourceUsage>;
}

/// Real process monitor backed by `sysinfo`.
#[derive(Clone, Default)]
pub struct SysinfoProcessMonitor;

impl SysinfoProcessMonitor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessMonitor for SysinfoProcessMonitor {
    async fn get_resource_usage(&self, pid: u32) -> Option<ResourceUsage> {
        tokio::task::spawn_blocking(move || sample_resource_usage(pid))
            .await
            .ok()
            .flatten()
    }
}

fn sample_resource_usage(pid: u32) -> Option<ResourceUsage> {
    let mut sys = System::new_all();
    sys.refresh_all();
    let process = sys.process(Pid::from_u32(pid))?;
    Some(ResourceUsage {
        cpu_percent: process.cpu_usage(),
        memory_mb: process.memory() as f32 / (1024.0 * 1024.0),
    })
}

/// Deterministic process monitor for tests: returns pre-seeded samples per pid.
#[derive(Clone, Default)]
pub struct FakeProcessMonitor {
    samples: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<u32, ResourceUsage>>>,
}

impl FakeProcessMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pid: u32, usage: ResourceUsage) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pid, usage);
    }

    pub fn clear(&self, pid: u32) {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).remove(&pid);
    }
}

#[async_trait]
impl ProcessMonitor for FakeProcessMonitor {
    async fn get_resource_usage(&self, pid: u32) -> Option<ResourceUsage> {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).get(&pid).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_monitor_returns_seeded_sample() {
        let monitor = FakeProcessMonitor::new();
        monitor.set(
            42,
            ResourceUsage {
                cpu_percent: 55.0,
                memory_mb: 512.0,
            },
        );
        let usage = monitor.get_resource_usage(42).await.unwrap();
        assert_eq!(usage.cpu_percent, 55.0);
        assert_eq!(usage.memory_mb, 512.0);
    }

    #[tokio::test]
    async fn fake_monitor_returns_none_for_unknown_pid() {
        let monitor = FakeProcessMonitor::new();
        assert!(monitor.get_resource_usage(999).await.is_none());
    }

    #[tokio::test]
    async fn real_monitor_handles_nonexistent_pid_gracefully() {
        let monitor = SysinfoProcessMonitor::new();
        // PID 1 exists on most systems but an absurdly high PID should not.
        let usage = monitor.get_resource_usage(u32::MAX - 1).await;
        assert!(usage.is_none() || usage.is_some());
    }
}
