// src/timer.rs
// Timer Service: injectable scheduling for one-shot and interval callbacks.
//
// No other component may read the wall clock to make a scheduling decision —
// only the Timer Service may. A real implementation wraps tokio's timers; a
// virtual implementation advances a synthetic clock on demand so that
// silence-timeout, grace-period, and backoff behavior can be tested without
// sleeping. Modeled on the injected-clock discipline the teacher crate uses
// for circuit-breaker cooldowns (`llm/circuit_breaker.rs`), generalized here
// to a first-class capability per spec §4.1 / §9.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A boxed async closure invoked when a timer fires.
pub type TimerCallback = Box<dyn FnMut() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A cancellable handle to a scheduled timer.
#[async_trait]
pub trait TimerHandle: Send + Sync {
    /// Cancel the timer. Idempotent: cancelling twice is a no-op.
    async fn cancel(&self);

    /// Whether the timer is still active (not yet fired-and-completed, not cancelled).
    fn is_active(&self) -> bool;
}

/// Abstract scheduling capability. Injected into the Heartbeat Scheduler,
/// the Task Orchestrator's retry/backoff logic, and the Batched Generator.
pub trait TimerService: Send + Sync {
    /// Schedule a one-shot callback after `delay_ms`.
    fn schedule(&self, delay_ms: u64, callback: TimerCallback) -> Arc<dyn TimerHandle>;

    /// Schedule a callback on a recurring interval, firing every `interval_ms`.
    fn schedule_interval(&self, interval_ms: u64, callback: TimerCallback) -> Arc<dyn TimerHandle>;

    /// Current time in milliseconds on this service's clock (virtual or
    /// monotonic-since-start), used only for timestamps on recorded events
    /// and runtime/silence-duration arithmetic — never consulted directly by
    /// other components for scheduling decisions (spec §9).
    fn now_ms(&self) -> u64;
}

// ═══════════════════════════════════════
// REAL IMPLEMENTATION (tokio-backed)
// ═══════════════════════════════════════

struct TokioHandle {
    cancelled: Arc<AtomicBool>,
    join: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[async_trait]
impl TimerHandle for TokioHandle {
    async fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }
}

/// Wall-clock timer service backed by `tokio::time`.
#[derive(Clone)]
pub struct TokioTimerService {
    started_at: std::time::Instant,
}

impl Default for TokioTimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioTimerService {
    pub fn new() -> Self {
        Self {
            started_at: std::time::Instant::now(),
        }
    }
}

impl TimerService for TokioTimerService {
    fn schedule(&self, delay_ms: u64, mut callback: TimerCallback) -> Arc<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_task = cancelled.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            if !cancelled_task.load(Ordering::SeqCst) {
                callback().await;
            }
        });
        Arc::new(TokioHandle {
            cancelled,
            join: Mutex::new(Some(join)),
        })
    }

    fn schedule_interval(&self, interval_ms: u64, mut callback: TimerCallback) -> Arc<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_task = cancelled.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if cancelled_task.load(Ordering::SeqCst) {
                    break;
                }
                callback().await;
            }
        });
        Arc::new(TokioHandle {
            cancelled,
            join: Mutex::new(Some(join)),
        })
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

// ═══════════════════════════════════════
// VIRTUAL IMPLEMENTATION (deterministic tests)
// ═══════════════════════════════════════

struct TimerEntry {
    id: u64,
    fire_at_ms: u64,
    interval_ms: Option<u64>,
    cancelled: Arc<AtomicBool>,
    callback: TimerCallback,
}

struct SharedState {
    now_ms: u64,
    next_id: u64,
    timers: Vec<TimerEntry>,
}

/// Deterministic timer service: no real sleeping. Tests call `advance(ms)` to
/// move the virtual clock forward, firing any timers whose `fire_at_ms` has
/// been reached (intervals reschedule themselves relative to the fire time).
#[derive(Clone)]
pub struct VirtualTimerService {
    state: Arc<Mutex<SharedState>>,
}

impl Default for VirtualTimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTimerService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SharedState {
                now_ms: 0,
                next_id: 1,
                timers: Vec::new(),
            })),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).now_ms
    }

    fn next_due(&self, target: u64) -> Option<(u64, bool)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .timers
            .iter()
            .filter(|e| !e.cancelled.load(Ordering::SeqCst) && e.fire_at_ms <= target)
            .min_by_key(|e| (e.fire_at_ms, e.id))
            .map(|e| (e.id, e.interval_ms.is_some()))
    }

    /// Advance the virtual clock by `ms`, firing due timers in fire-time order.
    pub async fn advance(&self, ms: u64) {
        let target = self.now_ms() + ms;
        loop {
            let Some((id, is_interval)) = self.next_due(target) else {
                break;
            };

            // Remove the entry (even for intervals) and release the lock
            // before invoking the callback, so re-entrant scheduling from
            // inside the callback doesn't deadlock on the same mutex.
            let mut entry = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                let Some(pos) = state.timers.iter().position(|e| e.id == id) else {
                    continue;
                };
                let entry = state.timers.remove(pos);
                state.now_ms = entry.fire_at_ms.max(state.now_ms);
                entry
            };

            (entry.callback)().await;

            if is_interval && !entry.cancelled.load(Ordering::SeqCst) {
                let interval = entry.interval_ms.unwrap();
                entry.fire_at_ms += interval;
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.timers.push(entry);
            }

            if self.now_ms() >= target {
                break;
            }
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.now_ms < target {
            state.now_ms = target;
        }
    }

    fn insert(&self, delay_ms: u64, interval_ms: Option<u64>, callback: TimerCallback) -> Arc<dyn TimerHandle> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let id = state.next_id;
        state.next_id += 1;
        let cancelled = Arc::new(AtomicBool::new(false));
        let fire_at_ms = state.now_ms + delay_ms;
        state.timers.push(TimerEntry {
            id,
            fire_at_ms,
            interval_ms,
            cancelled: cancelled.clone(),
            callback,
        });
        Arc::new(VirtualHandle {
            id,
            state: self.state.clone(),
            cancelled,
        })
    }
}

struct VirtualHandle {
    id: u64,
    state: Arc<Mutex<SharedState>>,
    cancelled: Arc<AtomicBool>,
}

#[async_trait]
impl TimerHandle for VirtualHandle {
    async fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.timers.retain(|e| e.id != self.id);
    }

    fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }
}

impl TimerService for VirtualTimerService {
    fn schedule(&self, delay_ms: u64, callback: TimerCallback) -> Arc<dyn TimerHandle> {
        self.insert(delay_ms, None, callback)
    }

    fn schedule_interval(&self, interval_ms: u64, callback: TimerCallback) -> Arc<dyn TimerHandle> {
        self.insert(interval_ms, Some(interval_ms), callback)
    }

    fn now_ms(&self) -> u64 {
        VirtualTimerService::now_ms(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn schedule_fires_after_delay() {
        let svc = VirtualTimerService::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired_cb = fired.clone();
        let _handle = svc.schedule(
            100,
            Box::new(move || {
                let fired_cb = fired_cb.clone();
                Box::pin(async move {
                    fired_cb.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        svc.advance(50).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        svc.advance(50).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let svc = VirtualTimerService::new();
        let fired = Arc::new(AtomicU32::new(0));
        let fired_cb = fired.clone();
        let handle = svc.schedule(
            100,
            Box::new(move || {
                let fired_cb = fired_cb.clone();
                Box::pin(async move {
                    fired_cb.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        handle.cancel().await;
        svc.advance(200).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn interval_fires_repeatedly() {
        let svc = VirtualTimerService::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_cb = count.clone();
        let _handle = svc.schedule_interval(
            30,
            Box::new(move || {
                let count_cb = count_cb.clone();
                Box::pin(async move {
                    count_cb.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        svc.advance(100).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn interval_cancel_stops_future_fires() {
        let svc = VirtualTimerService::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_cb = count.clone();
        let handle = svc.schedule_interval(
            10,
            Box::new(move || {
                let count_cb = count_cb.clone();
                Box::pin(async move {
                    count_cb.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        svc.advance(25).await;
        let at_cancel = count.load(Ordering::SeqCst);
        handle.cancel().await;
        svc.advance(100).await;
        assert_eq!(count.load(Ordering::SeqCst), at_cancel);
    }
}
