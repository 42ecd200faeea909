//! Three-state circuit breaker (C6) around the upstream classification call.
//!
//! Tracks consecutive failures and a cooldown timestamp. `HalfOpen` admits
//! exactly one in-flight probe at a time, which needs a single point of
//! serialization rather than independent atomics, hence the mutex.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Numeric encoding for the `ai_sorter_circuit_breaker_state` gauge.
    pub fn as_gauge_value(self) -> i64 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::HalfOpen => 1,
            BreakerState::Open => 2,
        }
    }
}

/// Outcome of asking the breaker for permission to call upstream.
pub enum Permit {
    /// Proceed with the call; report the result back via `on_success`/`on_failure`.
    Go,
    /// The circuit is open (or another caller already holds the sole
    /// HalfOpen probe slot); fail fast without contacting upstream.
    Denied,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
            failure_threshold,
            reset_timeout,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Ask for permission to call upstream. In `Closed`, always grants. In
    /// `Open`, grants exactly one transition-to-`HalfOpen` probe once
    /// `reset_timeout` has elapsed since `opened_at`, and denies everyone
    /// else (including concurrent callers that observe the same elapsed
    /// window; only the caller that performs the state transition wins).
    pub fn try_acquire(&self) -> Permit {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => Permit::Go,
            BreakerState::HalfOpen => Permit::Denied,
            BreakerState::Open => {
                let elapsed_ok = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(false);
                if elapsed_ok {
                    inner.state = BreakerState::HalfOpen;
                    Permit::Go
                } else {
                    Permit::Denied
                }
            }
        }
    }

    /// Returns true if this call caused a Closed→Open transition, so the
    /// caller can bump the `circuit_breaker_opens_total` counter exactly
    /// once per trip.
    pub fn on_failure(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                false
            }
            BreakerState::Open => false,
        }
    }

    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }
}
