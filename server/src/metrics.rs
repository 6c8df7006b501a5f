//! In-process metrics (§2 supplement, grounded on
//! `original_source/backend/app/telemetry/metrics.py`): request totals/
//! latency and scan-task totals/duration, exposed as plain text at
//! `GET /metrics`. Counters only — no external time-series backend, per
//! spec.md's observability Non-goals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct Metrics {
    requests_total: AtomicU64,
    request_duration_ms_total: AtomicU64,
    scan_tasks_total: AtomicU64,
    scan_task_duration_ms_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, duration: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.request_duration_ms_total.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_scan_task(&self, duration: Duration) {
        self.scan_tasks_total.fetch_add(1, Ordering::Relaxed);
        self.scan_task_duration_ms_total.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Renders the same simple `name value` text format the teacher's
    /// `original_source` counterpart exposes — no Prometheus client needed.
    pub fn render(&self) -> String {
        format!(
            "archon_requests_total {}\narchon_request_duration_ms_total {}\narchon_scan_tasks_total {}\narchon_scan_task_duration_ms_total {}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.request_duration_ms_total.load(Ordering::Relaxed),
            self.scan_tasks_total.load(Ordering::Relaxed),
            self.scan_task_duration_ms_total.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_recorded_counters() {
        let m = Metrics::new();
        m.record_request(Duration::from_millis(10));
        m.record_scan_task(Duration::from_millis(500));
        let text = m.render();
        assert!(text.contains("archon_requests_total 1"));
        assert!(text.contains("archon_scan_task_duration_ms_total 500"));
    }
}
