//! Lock-free run metrics
//!
//! Counters are plain atomics updated from the pipeline; a summary is logged
//! after every run.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

pub struct Metrics {
    started_at: Instant,
    runs_total: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_exhausted: AtomicU64,
    runs_faulted: AtomicU64,
    attempts_total: AtomicU64,
    attempt_failures: AtomicU64,
    images_stored: AtomicU64,
    notifications_sent: AtomicU64,
    notification_failures: AtomicU64,
    /// Longest run duration seen (ms)
    run_duration_max_ms: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            runs_total: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_exhausted: AtomicU64::new(0),
            runs_faulted: AtomicU64::new(0),
            attempts_total: AtomicU64::new(0),
            attempt_failures: AtomicU64::new(0),
            images_stored: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notification_failures: AtomicU64::new(0),
            run_duration_max_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_run_started(&self) {
        self.runs_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_run_succeeded(&self) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_run_exhausted(&self) {
        self.runs_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_run_faulted(&self) {
        self.runs_faulted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_run_duration(&self, duration_ms: u64) {
        update_atomic_max(&self.run_duration_max_ms, duration_ms);
    }

    #[inline]
    pub fn record_attempt(&self, succeeded: bool) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            self.images_stored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.attempt_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_notification(&self, delivered: bool) {
        if delivered {
            self.notifications_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.notification_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn runs_total(&self) -> u64 {
        self.runs_total.load(Ordering::Relaxed)
    }

    pub fn attempts_total(&self) -> u64 {
        self.attempts_total.load(Ordering::Relaxed)
    }

    pub fn notification_failures(&self) -> u64 {
        self.notification_failures.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters (counters are cumulative, never reset)
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            runs_total: self.runs_total.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_exhausted: self.runs_exhausted.load(Ordering::Relaxed),
            runs_faulted: self.runs_faulted.load(Ordering::Relaxed),
            attempts_total: self.attempts_total.load(Ordering::Relaxed),
            attempt_failures: self.attempt_failures.load(Ordering::Relaxed),
            images_stored: self.images_stored.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            run_duration_max_ms: self.run_duration_max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub runs_total: u64,
    pub runs_succeeded: u64,
    pub runs_exhausted: u64,
    pub runs_faulted: u64,
    pub attempts_total: u64,
    pub attempt_failures: u64,
    pub images_stored: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub run_duration_max_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            runs = %self.runs_total,
            succeeded = %self.runs_succeeded,
            exhausted = %self.runs_exhausted,
            faulted = %self.runs_faulted,
            attempts = %self.attempts_total,
            attempt_failures = %self.attempt_failures,
            images = %self.images_stored,
            notifications = %self.notifications_sent,
            notification_failures = %self.notification_failures,
            run_max_ms = %self.run_duration_max_ms,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_counters() {
        let metrics = Metrics::new();
        metrics.record_attempt(false);
        metrics.record_attempt(false);
        metrics.record_attempt(true);

        let summary = metrics.report();
        assert_eq!(summary.attempts_total, 3);
        assert_eq!(summary.attempt_failures, 2);
        assert_eq!(summary.images_stored, 1);
    }

    #[test]
    fn test_run_duration_keeps_max() {
        let metrics = Metrics::new();
        metrics.record_run_duration(1200);
        metrics.record_run_duration(800);
        metrics.record_run_duration(4100);
        assert_eq!(metrics.report().run_duration_max_ms, 4100);
    }

    #[test]
    fn test_notification_counters() {
        let metrics = Metrics::new();
        metrics.record_notification(true);
        metrics.record_notification(false);
        let summary = metrics.report();
        assert_eq!(summary.notifications_sent, 1);
        assert_eq!(summary.notification_failures, 1);
    }
}
