//! Circuit-breaker state for protected resources.
//!
//! Pure state and transition logic; the store-backed orchestration lives in
//! `application::circuit_breaker`. One `CircuitBreakerState` exists per
//! protected resource key and is persisted through the store port.
//!
//! # State Transitions
//! ```text
//! Closed → Open: windowed failure count reaches the trip threshold
//! Open → Half-Open: cooldown elapsed, claimed lazily by the next evaluation
//! Half-Open → Closed: the probe succeeds
//! Half-Open → Open: the probe fails (cooldown restarts)
//! ```
//!
//! While Half-Open, exactly one probe is outstanding; concurrent evaluations
//! are recorded as re-entry violations rather than additional probes.

use std::collections::VecDeque;
use std::time::Duration;

#[cfg(feature = "redis-storage")]
use serde::{Deserialize, Serialize};

/// Cap on retained failure timestamps. Window pruning is the primary bound;
/// this keeps the record small even with a large window.
const FAILURE_HISTORY_LIMIT: usize = 32;

/// Cap on retained re-entry timestamps.
const RE_ENTRY_HISTORY_LIMIT: usize = 32;

/// Breaker status for one protected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "redis-storage", derive(Serialize, Deserialize))]
pub enum BreakerStatus {
    /// Normal operation, calls pass through
    Closed,
    /// Resource assumed failing, calls short-circuit
    Open,
    /// Cooldown elapsed, a single probe is outstanding
    HalfOpen,
}

/// Persisted breaker state for one protected resource.
///
/// Invariant: `open_since` is set exactly when transitioning into Open and
/// remains valid through Half-Open; it is the basis for cooldown accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "redis-storage", derive(Serialize, Deserialize))]
pub struct CircuitBreakerState {
    /// Current status
    pub status: BreakerStatus,
    /// Recent failure timestamps, newest last, bounded ring
    pub failures: VecDeque<u64>,
    /// Most recent failure timestamp
    pub last_failure: Option<u64>,
    /// When the breaker last entered Open; valid in Open and Half-Open
    pub open_since: Option<u64>,
    /// Most recent success timestamp
    pub last_success: Option<u64>,
    /// Probe attempts rejected while a probe was outstanding, bounded ring
    pub re_entries: VecDeque<u64>,
}

impl CircuitBreakerState {
    /// Fresh state: Closed with no history.
    pub fn new() -> Self {
        Self {
            status: BreakerStatus::Closed,
            failures: VecDeque::new(),
            last_failure: None,
            open_since: None,
            last_success: None,
            re_entries: VecDeque::new(),
        }
    }

    /// Count failures that fall within the sliding window ending at `now`.
    ///
    /// Logical pruning only; retained entries outside the window are ignored.
    pub fn windowed_failures(&self, now: u64, window: Duration) -> usize {
        let horizon = now.saturating_sub(window.as_secs());
        self.failures.iter().filter(|&&at| at >= horizon).count()
    }

    /// Whether the cooldown period has elapsed since entering Open.
    ///
    /// Always false outside Open.
    pub fn cooldown_elapsed(&self, now: u64, cooldown: Duration) -> bool {
        match (self.status, self.open_since) {
            (BreakerStatus::Open, Some(since)) => now.saturating_sub(since) >= cooldown.as_secs(),
            _ => false,
        }
    }

    /// Record a failure at `now`, tripping or re-opening as the state machine
    /// dictates.
    ///
    /// Closed: appends to the failure window and trips to Open once the
    /// windowed count reaches `trip_threshold`. Half-Open: the probe failed,
    /// so the breaker re-opens and the cooldown restarts. Open: failure is
    /// recorded, status unchanged.
    pub fn record_failure(&mut self, now: u64, window: Duration, trip_threshold: u32) {
        self.push_failure(now, window);
        self.last_failure = Some(now);

        match self.status {
            BreakerStatus::Closed => {
                if self.windowed_failures(now, window) >= trip_threshold as usize {
                    self.status = BreakerStatus::Open;
                    self.open_since = Some(now);
                }
            }
            BreakerStatus::HalfOpen => {
                self.status = BreakerStatus::Open;
                self.open_since = Some(now);
            }
            BreakerStatus::Open => {}
        }
    }

    /// Record a success at `now`.
    ///
    /// Half-Open: the probe succeeded, so the breaker closes and the failure
    /// window clears. Closed: only `last_success` moves; the sliding window
    /// keeps its entries, a lone success does not erase recent failures.
    pub fn record_success(&mut self, now: u64) {
        self.last_success = Some(now);

        if self.status == BreakerStatus::HalfOpen {
            self.status = BreakerStatus::Closed;
            self.failures.clear();
            self.open_since = None;
        }
    }

    /// Claim the single probe slot: Open → Half-Open.
    ///
    /// Callers must verify `cooldown_elapsed` first and commit the claim via
    /// store compare-and-swap; the CAS losing side must not treat itself as
    /// the probe owner.
    pub fn begin_probe(&mut self) {
        debug_assert_eq!(self.status, BreakerStatus::Open);
        self.status = BreakerStatus::HalfOpen;
    }

    /// Record a rejected concurrent probe attempt at `now`.
    pub fn record_re_entry(&mut self, now: u64) {
        self.re_entries.push_back(now);
        while self.re_entries.len() > RE_ENTRY_HISTORY_LIMIT {
            self.re_entries.pop_front();
        }
    }

    /// Append a failure timestamp, pruning entries that left the window and
    /// capping the retained history.
    fn push_failure(&mut self, now: u64, window: Duration) {
        let horizon = now.saturating_sub(window.as_secs());
        while let Some(&oldest) = self.failures.front() {
            if oldest < horizon {
                self.failures.pop_front();
            } else {
                break;
            }
        }

        self.failures.push_back(now);
        while self.failures.len() > FAILURE_HISTORY_LIMIT {
            self.failures.pop_front();
        }
    }
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_initial_state() {
        let state = CircuitBreakerState::new();
        assert_eq!(state.status, BreakerStatus::Closed);
        assert_eq!(state.windowed_failures(1_000, WINDOW), 0);
        assert!(state.open_since.is_none());
    }

    #[test]
    fn test_trips_at_threshold() {
        let mut state = CircuitBreakerState::new();

        state.record_failure(100, WINDOW, 3);
        state.record_failure(110, WINDOW, 3);
        assert_eq!(state.status, BreakerStatus::Closed);

        state.record_failure(120, WINDOW, 3);
        assert_eq!(state.status, BreakerStatus::Open);
        assert_eq!(state.open_since, Some(120));
        assert_eq!(state.last_failure, Some(120));
    }

    #[test]
    fn test_failures_outside_window_do_not_trip() {
        let mut state = CircuitBreakerState::new();

        state.record_failure(100, WINDOW, 3);
        state.record_failure(110, WINDOW, 3);
        // Third failure lands after the first two have left the window
        state.record_failure(500, WINDOW, 3);

        assert_eq!(state.status, BreakerStatus::Closed);
        assert_eq!(state.windowed_failures(500, WINDOW), 1);
    }

    #[test]
    fn test_cooldown_accounting() {
        let mut state = CircuitBreakerState::new();
        state.record_failure(100, WINDOW, 1);
        assert_eq!(state.status, BreakerStatus::Open);

        let cooldown = Duration::from_secs(30);
        assert!(!state.cooldown_elapsed(129, cooldown));
        assert!(state.cooldown_elapsed(130, cooldown));
    }

    #[test]
    fn test_probe_success_closes_and_clears() {
        let mut state = CircuitBreakerState::new();
        state.record_failure(100, WINDOW, 1);
        state.begin_probe();
        assert_eq!(state.status, BreakerStatus::HalfOpen);

        state.record_success(140);
        assert_eq!(state.status, BreakerStatus::Closed);
        assert!(state.failures.is_empty());
        assert_eq!(state.last_success, Some(140));
        assert!(state.open_since.is_none());
    }

    #[test]
    fn test_probe_failure_reopens_and_restarts_cooldown() {
        let mut state = CircuitBreakerState::new();
        state.record_failure(100, WINDOW, 1);
        assert_eq!(state.open_since, Some(100));

        state.begin_probe();
        state.record_failure(140, WINDOW, 1);

        assert_eq!(state.status, BreakerStatus::Open);
        assert_eq!(state.open_since, Some(140));
    }

    #[test]
    fn test_success_in_closed_keeps_failure_window() {
        let mut state = CircuitBreakerState::new();
        state.record_failure(100, WINDOW, 3);
        state.record_failure(110, WINDOW, 3);

        state.record_success(115);
        assert_eq!(state.status, BreakerStatus::Closed);

        // The earlier failures still count toward the trip threshold
        state.record_failure(120, WINDOW, 3);
        assert_eq!(state.status, BreakerStatus::Open);
    }

    #[test]
    fn test_failure_history_is_bounded() {
        let mut state = CircuitBreakerState::new();
        for i in 0..200 {
            // Large threshold so the breaker stays closed while we append
            state.record_failure(1_000 + i, Duration::from_secs(10_000), 1_000);
        }

        assert!(state.failures.len() <= FAILURE_HISTORY_LIMIT);
        // Newest entries are the ones retained
        assert_eq!(state.failures.back(), Some(&1_199));
    }

    #[test]
    fn test_re_entry_history_is_bounded() {
        let mut state = CircuitBreakerState::new();
        for i in 0..100 {
            state.record_re_entry(2_000 + i);
        }

        assert!(state.re_entries.len() <= RE_ENTRY_HISTORY_LIMIT);
        assert_eq!(state.re_entries.back(), Some(&2_099));
    }
}
