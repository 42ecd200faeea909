//! Token-bucket rate limiter (C5) gating calls to the upstream classifier.
//!
//! Internally synchronized with a `std::sync::Mutex`, matching the
//! teacher's preference for mutex-protected shared state (`TelemetrySink`'s
//! `Mutex<RotatingWriter>`) over a dedicated lock crate.

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Inner {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    inner: Mutex<Inner>,
    capacity: f64,
    window: Duration,
}

impl TokenBucket {
    pub fn new(capacity: f64, window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            window,
        }
    }

    fn refill_locked(&self, inner: &mut Inner) {
        let elapsed = inner.last_refill.elapsed();
        if elapsed.is_zero() {
            return;
        }
        let rate = self.capacity / self.window.as_secs_f64();
        inner.tokens = (inner.tokens + elapsed.as_secs_f64() * rate).min(self.capacity);
        inner.last_refill = Instant::now();
    }

    /// Non-blocking: succeeds if at least one token is available.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.refill_locked(&mut inner);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait up to `timeout` for a token. A cancelled/timed-out wait does not
    /// refund anything: no token was consumed on the failed attempts, which
    /// keeps the bucket model simple.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_acquire() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let step = remaining.min(Duration::from_millis(20));
            if step.is_zero() {
                return false;
            }
            tokio::time::sleep(step).await;
        }
    }
}
