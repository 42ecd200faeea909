//! Lifecycle Manager (C10): readiness flag plus graceful shutdown on
//! SIGINT/SIGTERM, draining in-flight `/sort` handlers before the process
//! exits.
//!
//! Listens for both `ctrl_c()` and SIGTERM, the signal a container
//! orchestrator actually sends, and polls the active-requests gauge for a
//! bounded grace period instead of exiting immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::metrics::SharedMetrics;

#[derive(Clone)]
pub struct Lifecycle {
    ready: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Resolves once SIGINT or SIGTERM arrives.
    pub async fn wait_for_shutdown_signal(&self) {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
        self.ready.store(false, Ordering::SeqCst);
    }

    /// Polls `metrics.active_requests()` until it reaches zero or `grace`
    /// elapses. Returns `true` if the drain completed cleanly.
    pub async fn drain(&self, metrics: &SharedMetrics, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            if metrics.active_requests() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    remaining = metrics.active_requests(),
                    "shutdown grace period exceeded with requests still in flight"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_ready() {
        let lc = Lifecycle::new();
        assert!(!lc.is_ready());
        lc.mark_ready();
        assert!(lc.is_ready());
    }

    #[tokio::test]
    async fn drain_returns_immediately_when_idle() {
        let lc = Lifecycle::new();
        let metrics: SharedMetrics = Arc::new(crate::metrics::MetricsRegistry::new());
        let clean = lc.drain(&metrics, Duration::from_millis(500)).await;
        assert!(clean);
    }

    #[tokio::test]
    async fn drain_times_out_with_requests_still_in_flight() {
        let lc = Lifecycle::new();
        let metrics: SharedMetrics = Arc::new(crate::metrics::MetricsRegistry::new());
        metrics.inc_active_requests();
        let clean = lc.drain(&metrics, Duration::from_millis(80)).await;
        assert!(!clean);
    }
}
