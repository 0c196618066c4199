//! Store-backed circuit breaker for protected resources.
//!
//! Prevents a consistently-failing protected resource from being hammered by
//! every request, while allowing controlled recovery probing. State lives in
//! the shared store, one record per resource key, so all processes sharing
//! the store see the same breaker.
//!
//! `evaluate` is the only allow/deny entry point and owns the lazy
//! Open → Half-Open transition: the evaluation that observes an elapsed
//! cooldown claims the single probe slot through the store's
//! compare-and-swap. Losing claimants observe Half-Open on reload and are
//! rejected as re-entry violations, which is what keeps a thundering herd
//! from probing simultaneously. `record_success` / `record_failure` resolve
//! the probe and maintain the sliding failure window without rendering a
//! fresh verdict.

use crate::application::ports::{Clock, RateLimitStore, StoreError};
use crate::domain::breaker::{BreakerStatus, CircuitBreakerState};
use crate::domain::decision::Cause;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Bounded reload-and-classify attempts when an evaluation loses the probe
/// claim race.
const CAS_ATTEMPTS: usize = 4;

/// Bounded retries for recording an outcome. Each lost race means another
/// writer committed, so contention this deep is pathological.
const UPDATE_CAS_ATTEMPTS: usize = 64;

/// Invalid circuit-breaker configuration.
///
/// Raised at configuration time only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerConfigError {
    /// The trip threshold must be at least 1
    ZeroTripThreshold,
    /// The sliding failure window must be non-zero
    ZeroFailureWindow,
    /// The cooldown must be non-zero
    ZeroCooldown,
}

impl fmt::Display for BreakerConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerConfigError::ZeroTripThreshold => {
                write!(f, "trip_threshold must be greater than 0")
            }
            BreakerConfigError::ZeroFailureWindow => {
                write!(f, "failure_window must be non-zero")
            }
            BreakerConfigError::ZeroCooldown => write!(f, "cooldown must be non-zero"),
        }
    }
}

impl std::error::Error for BreakerConfigError {}

/// Configuration for circuit breaker behavior.
///
/// There are no default values: trip threshold, window, and cooldown are
/// deployment policy and must be supplied by the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    trip_threshold: u32,
    failure_window: Duration,
    cooldown: Duration,
}

impl CircuitBreakerConfig {
    /// Build a validated configuration.
    ///
    /// # Arguments
    /// * `trip_threshold` - failures within the window that open the breaker
    /// * `failure_window` - sliding window for failure accounting
    /// * `cooldown` - how long the breaker stays Open before probing
    ///
    /// # Errors
    /// [`BreakerConfigError`] if any value is zero.
    pub fn new(
        trip_threshold: u32,
        failure_window: Duration,
        cooldown: Duration,
    ) -> Result<Self, BreakerConfigError> {
        if trip_threshold == 0 {
            return Err(BreakerConfigError::ZeroTripThreshold);
        }
        if failure_window.is_zero() {
            return Err(BreakerConfigError::ZeroFailureWindow);
        }
        if cooldown.is_zero() {
            return Err(BreakerConfigError::ZeroCooldown);
        }
        Ok(Self {
            trip_threshold,
            failure_window,
            cooldown,
        })
    }

    /// Failures within the window that open the breaker.
    pub fn trip_threshold(&self) -> u32 {
        self.trip_threshold
    }

    /// Sliding window for failure accounting.
    pub fn failure_window(&self) -> Duration {
        self.failure_window
    }

    /// How long the breaker stays Open before probing.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

/// Outcome of a breaker evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerDecision {
    /// Whether the call may reach the resource
    pub allowed: bool,
    /// Denial cause; `None` when allowed
    pub cause: Option<Cause>,
}

impl BreakerDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            cause: None,
        }
    }

    fn denied(cause: Cause) -> Self {
        Self {
            allowed: false,
            cause: Some(cause),
        }
    }
}

/// Circuit breaker over the shared store.
///
/// Stateless itself; safe to clone and share across request handlers.
#[derive(Debug, Clone)]
pub struct CircuitBreaker<S>
where
    S: RateLimitStore + Clone,
{
    store: S,
    clock: Arc<dyn Clock>,
    config: CircuitBreakerConfig,
}

impl<S> CircuitBreaker<S>
where
    S: RateLimitStore + Clone,
{
    /// Create a breaker over a store and clock.
    pub fn new(store: S, clock: Arc<dyn Clock>, config: CircuitBreakerConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Decide whether a call may reach `resource`, performing any lazy
    /// time-based transition this evaluation is responsible for.
    ///
    /// Closed (or no recorded state) allows. Open denies with
    /// `circuit_breaker_open` until the cooldown elapses; the first
    /// evaluation after that claims the probe slot via compare-and-swap and
    /// is allowed through. Half-Open with the probe outstanding denies with
    /// `re_entry_violation` without consuming the slot.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked. Recording a re-entry violation is
    /// best-effort: the denial stands even if that auxiliary write fails.
    pub fn evaluate(&self, resource: &str) -> Result<BreakerDecision, StoreError> {
        let now = self.clock.now();

        for _ in 0..CAS_ATTEMPTS {
            let versioned = match self.store.get_breaker(resource)? {
                None => return Ok(BreakerDecision::allowed()),
                Some(versioned) => versioned,
            };

            match versioned.state.status {
                BreakerStatus::Closed => return Ok(BreakerDecision::allowed()),
                BreakerStatus::HalfOpen => {
                    let mut state = versioned.state.clone();
                    state.record_re_entry(now);

                    // The verdict does not depend on this write; losing the
                    // version race or a failed write only loses one
                    // observability entry.
                    if let Err(e) =
                        self.store
                            .save_breaker(resource, Some(versioned.version), &state)
                    {
                        tracing::warn!(
                            resource = resource,
                            error = %e,
                            "failed to record re-entry violation"
                        );
                    }

                    return Ok(BreakerDecision::denied(Cause::ReEntryViolation));
                }
                BreakerStatus::Open => {
                    if !versioned.state.cooldown_elapsed(now, self.config.cooldown) {
                        return Ok(BreakerDecision::denied(Cause::CircuitBreakerOpen));
                    }

                    // Cooldown elapsed: try to claim the single probe slot.
                    let mut state = versioned.state.clone();
                    state.begin_probe();

                    if self
                        .store
                        .save_breaker(resource, Some(versioned.version), &state)?
                        .committed()
                    {
                        return Ok(BreakerDecision::allowed());
                    }
                    // Lost the claim race; reload and classify against the
                    // winner's state.
                }
            }
        }

        tracing::warn!(
            resource = resource,
            "breaker evaluation exhausted compare-and-swap attempts"
        );
        Ok(BreakerDecision::denied(Cause::CircuitBreakerOpen))
    }

    /// Record that the probe or protected operation succeeded.
    ///
    /// Resolves an outstanding probe (Half-Open → Closed, window cleared)
    /// and refreshes `last_success`. A resource with no recorded state stays
    /// absent; breaker records are created by failures, not successes.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn record_success(&self, resource: &str) -> Result<(), StoreError> {
        let now = self.clock.now();

        self.update(resource, |state| state.record_success(now), false)
    }

    /// Record that the probe or protected operation failed.
    ///
    /// Appends to the sliding failure window, tripping Closed → Open at the
    /// threshold and resolving a failed probe (Half-Open → Open with a fresh
    /// cooldown).
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn record_failure(&self, resource: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let window = self.config.failure_window;
        let threshold = self.config.trip_threshold;

        self.update(
            resource,
            |state| state.record_failure(now, window, threshold),
            true,
        )
    }

    /// Read-only view of the breaker state for diagnostics.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn state(&self, resource: &str) -> Result<Option<CircuitBreakerState>, StoreError> {
        Ok(self.store.get_breaker(resource)?.map(|v| v.state))
    }

    /// Load-mutate-save with bounded compare-and-swap retries.
    ///
    /// `create_if_absent` controls lazy record creation (failures create,
    /// successes do not).
    fn update<F>(&self, resource: &str, mutate: F, create_if_absent: bool) -> Result<(), StoreError>
    where
        F: Fn(&mut CircuitBreakerState),
    {
        for _ in 0..UPDATE_CAS_ATTEMPTS {
            let (mut state, expected) = match self.store.get_breaker(resource)? {
                Some(versioned) => (versioned.state, Some(versioned.version)),
                None if create_if_absent => (CircuitBreakerState::new(), None),
                None => return Ok(()),
            };

            mutate(&mut state);

            if self
                .store
                .save_breaker(resource, expected, &state)?
                .committed()
            {
                return Ok(());
            }
        }

        Err(StoreError::Unavailable(format!(
            "breaker state for '{}' under sustained compare-and-swap contention",
            resource
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::store::InMemoryStore;
    use std::thread;

    fn config(threshold: u32, window_secs: u64, cooldown_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            threshold,
            Duration::from_secs(window_secs),
            Duration::from_secs(cooldown_secs),
        )
        .unwrap()
    }

    fn breaker(
        cfg: CircuitBreakerConfig,
        start: u64,
    ) -> (CircuitBreaker<Arc<InMemoryStore>>, Arc<MockClock>) {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(MockClock::new(start));
        (CircuitBreaker::new(store, clock.clone(), cfg), clock)
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            CircuitBreakerConfig::new(0, Duration::from_secs(60), Duration::from_secs(30)),
            Err(BreakerConfigError::ZeroTripThreshold)
        );
        assert_eq!(
            CircuitBreakerConfig::new(3, Duration::ZERO, Duration::from_secs(30)),
            Err(BreakerConfigError::ZeroFailureWindow)
        );
        assert_eq!(
            CircuitBreakerConfig::new(3, Duration::from_secs(60), Duration::ZERO),
            Err(BreakerConfigError::ZeroCooldown)
        );
    }

    #[test]
    fn test_unknown_resource_allows() {
        let (cb, _clock) = breaker(config(3, 60, 30), 1_000);
        let decision = cb.evaluate("login").unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.cause, None);
    }

    #[test]
    fn test_trips_after_threshold_failures() {
        let (cb, _clock) = breaker(config(3, 60, 30), 1_000);

        cb.record_failure("login").unwrap();
        cb.record_failure("login").unwrap();
        assert!(cb.evaluate("login").unwrap().allowed);

        cb.record_failure("login").unwrap();
        let decision = cb.evaluate("login").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.cause, Some(Cause::CircuitBreakerOpen));
        assert_eq!(
            cb.state("login").unwrap().unwrap().status,
            BreakerStatus::Open
        );
    }

    #[test]
    fn test_cooldown_boundary() {
        let (cb, clock) = breaker(config(1, 60, 30), 1_000);
        cb.record_failure("login").unwrap();

        // One second short of the cooldown: still short-circuited
        clock.advance(Duration::from_secs(29));
        let decision = cb.evaluate("login").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.cause, Some(Cause::CircuitBreakerOpen));

        // At the cooldown: this evaluation claims the probe
        clock.advance(Duration::from_secs(1));
        let decision = cb.evaluate("login").unwrap();
        assert!(decision.allowed);
        assert_eq!(
            cb.state("login").unwrap().unwrap().status,
            BreakerStatus::HalfOpen
        );
    }

    #[test]
    fn test_second_evaluation_during_probe_is_re_entry_violation() {
        let (cb, clock) = breaker(config(1, 60, 30), 1_000);
        cb.record_failure("login").unwrap();
        clock.advance(Duration::from_secs(30));

        assert!(cb.evaluate("login").unwrap().allowed);

        let decision = cb.evaluate("login").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.cause, Some(Cause::ReEntryViolation));

        // The violation was recorded, the probe slot was not consumed
        let state = cb.state("login").unwrap().unwrap();
        assert_eq!(state.status, BreakerStatus::HalfOpen);
        assert_eq!(state.re_entries.len(), 1);
    }

    #[test]
    fn test_probe_success_closes() {
        let (cb, clock) = breaker(config(1, 60, 30), 1_000);
        cb.record_failure("login").unwrap();
        clock.advance(Duration::from_secs(30));
        assert!(cb.evaluate("login").unwrap().allowed);

        cb.record_success("login").unwrap();

        let state = cb.state("login").unwrap().unwrap();
        assert_eq!(state.status, BreakerStatus::Closed);
        assert!(state.failures.is_empty());
        assert!(cb.evaluate("login").unwrap().allowed);
    }

    #[test]
    fn test_probe_failure_restarts_cooldown() {
        let (cb, clock) = breaker(config(1, 60, 30), 1_000);
        cb.record_failure("login").unwrap();
        clock.advance(Duration::from_secs(30));
        assert!(cb.evaluate("login").unwrap().allowed);

        cb.record_failure("login").unwrap();

        let state = cb.state("login").unwrap().unwrap();
        assert_eq!(state.status, BreakerStatus::Open);
        assert_eq!(state.open_since, Some(1_030));

        // A full new cooldown applies
        clock.advance(Duration::from_secs(29));
        assert!(!cb.evaluate("login").unwrap().allowed);
        clock.advance(Duration::from_secs(1));
        assert!(cb.evaluate("login").unwrap().allowed);
    }

    #[test]
    fn test_success_without_state_is_a_no_op() {
        let (cb, _clock) = breaker(config(1, 60, 30), 1_000);
        cb.record_success("login").unwrap();
        assert!(cb.state("login").unwrap().is_none());
    }

    #[test]
    fn test_resources_are_independent() {
        let (cb, _clock) = breaker(config(1, 60, 30), 1_000);
        cb.record_failure("login").unwrap();

        assert!(!cb.evaluate("login").unwrap().allowed);
        assert!(cb.evaluate("password-reset").unwrap().allowed);
    }

    #[test]
    fn test_concurrent_probe_claims_are_exclusive() {
        let (cb, clock) = breaker(config(1, 60, 30), 1_000);
        cb.record_failure("login").unwrap();
        clock.advance(Duration::from_secs(30));

        let cb = Arc::new(cb);
        let mut handles = vec![];
        for _ in 0..8 {
            let cb = Arc::clone(&cb);
            handles.push(thread::spawn(move || cb.evaluate("login").unwrap()));
        }

        let decisions: Vec<BreakerDecision> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let allowed = decisions.iter().filter(|d| d.allowed).count();
        assert_eq!(allowed, 1, "exactly one evaluator may own the probe slot");

        // Everyone else lost the claim race and was rejected
        for denied in decisions.iter().filter(|d| !d.allowed) {
            assert!(matches!(
                denied.cause,
                Some(Cause::ReEntryViolation) | Some(Cause::CircuitBreakerOpen)
            ));
        }
    }

    #[test]
    fn test_concurrent_failures_all_counted() {
        let (cb, _clock) = breaker(config(100, 600, 30), 1_000);
        let cb = Arc::new(cb);

        let mut handles = vec![];
        for _ in 0..10 {
            let cb = Arc::clone(&cb);
            handles.push(thread::spawn(move || {
                for _ in 0..3 {
                    cb.record_failure("login").unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = cb.state("login").unwrap().unwrap();
        assert_eq!(state.windowed_failures(1_000, Duration::from_secs(600)), 30);
    }
}
