// src/heartbeat/mod.rs
// Heartbeat subsystem: scheduler (§4.4) + monitor facade (§4.5).

pub mod monitor;
pub mod scheduler;

pub use monitor::{
    to_legacy_events, ChildControl, ChildStreams, HeartbeatEvent, HeartbeatMonitor, LegacyEvent,
    MonitoredProcess, GRACE_PERIOD_MS, RING_BUFFER_CAP,
};
pub use scheduler::{HeartbeatScheduler, SchedulerStats, TaskId};
