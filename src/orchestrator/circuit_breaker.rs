// src/orchestrator/circuit_breaker.rs
// Consecutive-failure circuit breaker for the Task Orchestrator. Grounded in
// the teacher's per-provider `llm/circuit_breaker.rs`, adapted to a single
// breaker per orchestrator run (not keyed per-provider) and to the spec's
// adopted resolution of the open circuit-breaker-reset question: the breaker
// only leaves `Open` when the next `processBatch` call begins, not on a
// timer-based cooldown.

use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
}

/// Tracks consecutive task failures across a `processBatch` invocation.
/// Threshold failures trip the breaker to `Open`: no further admissions are
/// allowed and queued tasks fail fast with `circuit-open`. In-flight tasks
/// are allowed to finish. The breaker becomes `HalfOpen` at the start of the
/// next `processBatch` call (§4.6 step 8 / §9 open question).
pub struct CircuitBreaker {
    threshold: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    /// Call at the start of every `processBatch`: if the breaker tripped
    /// during a prior invocation, allow one more round of admissions.
    pub fn begin_batch(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state == CircuitState::Open {
            info!("circuit breaker half-open for new batch");
            inner.state = CircuitState::HalfOpen;
        }
    }

    /// Whether new tasks may currently be admitted.
    pub fn is_admitting(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let was_half_open = inner.state == CircuitState::HalfOpen;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        if was_half_open {
            info!("circuit breaker closed after half-open success");
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state == CircuitState::HalfOpen {
            warn!("circuit breaker re-opened after half-open failure");
            inner.state = CircuitState::Open;
            return;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.threshold && self.threshold > 0 {
            warn!(
                consecutive_failures = inner.consecutive_failures,
                threshold = self.threshold,
                "circuit breaker tripped"
            );
            inner.state = CircuitState::Open;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_by_default_and_admitting() {
        let cb = CircuitBreaker::new(3);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.is_admitting());
    }

    #[test]
    fn threshold_failures_trip_the_breaker() {
        let cb = CircuitBreaker::new(3);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_admitting());
        cb.record_failure();
        assert!(!cb.is_admitting());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(3);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.is_admitting());
    }

    #[test]
    fn begin_batch_half_opens_a_tripped_breaker() {
        let cb = CircuitBreaker::new(1);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.begin_batch();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.is_admitting());
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreaker::new(1);
        cb.record_failure();
        cb.begin_batch();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
