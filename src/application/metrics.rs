//! Observability metrics for decision outcomes.
//!
//! Provides counters for monitoring engine behavior. The engine records
//! decisions here; persistence of individual decisions is the caller's
//! telemetry collaborator, not ours.

use crate::domain::decision::Verdict;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking decision statistics.
///
/// All counters use atomic operations for thread-safe updates and reads, and
/// can be queried at any time.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    allowed: AtomicU64,
    throttled: AtomicU64,
    challenged: AtomicU64,
    blocked: AtomicU64,
    /// Decisions taken under a store failure (either degradation direction)
    store_failures: AtomicU64,
    re_entry_violations: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                allowed: AtomicU64::new(0),
                throttled: AtomicU64::new(0),
                challenged: AtomicU64::new(0),
                blocked: AtomicU64::new(0),
                store_failures: AtomicU64::new(0),
                re_entry_violations: AtomicU64::new(0),
            }),
        }
    }

    /// Record a decision by verdict.
    pub(crate) fn record_verdict(&self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Allow => &self.inner.allowed,
            Verdict::Throttle => &self.inner.throttled,
            Verdict::Challenge => &self.inner.challenged,
            Verdict::Block => &self.inner.blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decision degraded by a store failure.
    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected concurrent probe attempt.
    pub(crate) fn record_re_entry_violation(&self) {
        self.inner
            .re_entry_violations
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Total allowed decisions.
    pub fn allowed(&self) -> u64 {
        self.inner.allowed.load(Ordering::Relaxed)
    }

    /// Total throttled decisions.
    pub fn throttled(&self) -> u64 {
        self.inner.throttled.load(Ordering::Relaxed)
    }

    /// Total challenged decisions.
    pub fn challenged(&self) -> u64 {
        self.inner.challenged.load(Ordering::Relaxed)
    }

    /// Total blocked decisions.
    pub fn blocked(&self) -> u64 {
        self.inner.blocked.load(Ordering::Relaxed)
    }

    /// Total decisions degraded by store failures.
    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    /// Total re-entry violations observed.
    pub fn re_entry_violations(&self) -> u64 {
        self.inner.re_entry_violations.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed(),
            throttled: self.throttled(),
            challenged: self.challenged(),
            blocked: self.blocked(),
            store_failures: self.store_failures(),
            re_entry_violations: self.re_entry_violations(),
        }
    }

    /// Reset all metrics to zero.
    ///
    /// Useful for tests or when starting a new monitoring period.
    pub fn reset(&self) {
        self.inner.allowed.store(0, Ordering::Relaxed);
        self.inner.throttled.store(0, Ordering::Relaxed);
        self.inner.challenged.store(0, Ordering::Relaxed);
        self.inner.blocked.store(0, Ordering::Relaxed);
        self.inner.store_failures.store(0, Ordering::Relaxed);
        self.inner.re_entry_violations.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total allowed decisions
    pub allowed: u64,
    /// Total throttled decisions
    pub throttled: u64,
    /// Total challenged decisions
    pub challenged: u64,
    /// Total blocked decisions
    pub blocked: u64,
    /// Total decisions degraded by store failures
    pub store_failures: u64,
    /// Total re-entry violations observed
    pub re_entry_violations: u64,
}

impl MetricsSnapshot {
    /// Total decisions rendered.
    pub fn total_decisions(&self) -> u64 {
        self.allowed
            .saturating_add(self.throttled)
            .saturating_add(self.challenged)
            .saturating_add(self.blocked)
    }

    /// Fraction of decisions that did not allow the request (0.0 to 1.0).
    ///
    /// Returns 0.0 when no decisions have been rendered.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_decisions();
        if total == 0 {
            0.0
        } else {
            (total - self.allowed) as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.total_decisions(), 0);
        assert_eq!(snapshot.denial_rate(), 0.0);
    }

    #[test]
    fn test_verdict_recording() {
        let metrics = Metrics::new();
        metrics.record_verdict(Verdict::Allow);
        metrics.record_verdict(Verdict::Allow);
        metrics.record_verdict(Verdict::Throttle);
        metrics.record_verdict(Verdict::Challenge);
        metrics.record_verdict(Verdict::Block);

        assert_eq!(metrics.allowed(), 2);
        assert_eq!(metrics.throttled(), 1);
        assert_eq!(metrics.challenged(), 1);
        assert_eq!(metrics.blocked(), 1);
        assert_eq!(metrics.snapshot().total_decisions(), 5);
    }

    #[test]
    fn test_denial_rate() {
        let metrics = Metrics::new();
        metrics.record_verdict(Verdict::Allow);
        metrics.record_verdict(Verdict::Block);

        assert!((metrics.snapshot().denial_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_verdict(Verdict::Allow);
        metrics.record_store_failure();
        metrics.record_re_entry_violation();

        metrics.reset();

        assert_eq!(metrics.snapshot().total_decisions(), 0);
        assert_eq!(metrics.store_failures(), 0);
        assert_eq!(metrics.re_entry_violations(), 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();

        clone.record_verdict(Verdict::Throttle);
        assert_eq!(metrics.throttled(), 1);
    }
}
