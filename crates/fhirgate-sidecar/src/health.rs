//! Liveness and readiness reporting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Liveness or readiness report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    /// `ok`, `ready` or `not_ready`.
    pub status: &'static str,
    /// Seconds since the sidecar started.
    pub uptime_seconds: u64,
    /// Sidecar version.
    pub version: &'static str,
}

/// Tracks process start and whether the listener is accepting.
#[derive(Debug)]
pub struct HealthChecker {
    started_at: Instant,
    ready: AtomicBool,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    /// Creates a checker that is not ready yet.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            ready: AtomicBool::new(false),
        }
    }

    /// Marks the sidecar ready or not ready.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Returns true once the listener is bound.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// The liveness report. Always `ok` while the process runs.
    pub fn liveness(&self) -> HealthReport {
        self.report("ok")
    }

    /// The readiness report.
    pub fn readiness(&self) -> HealthReport {
        self.report(if self.is_ready() { "ready" } else { "not_ready" })
    }

    fn report(&self, status: &'static str) -> HealthReport {
        HealthReport {
            status,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            version: crate::VERSION,
        }
    }
}
