//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the
//! application layer needs. Infrastructure adapters implement these ports.
//!
//! The engine itself is stateless; everything mutable lives behind
//! [`RateLimitStore`]. The store owns the atomicity guarantees the engine's
//! correctness depends on: increment-and-read for budgets, compare-and-swap
//! for breaker state.

use crate::domain::breaker::CircuitBreakerState;
use crate::domain::budget::BudgetRecord;
use std::fmt;
use std::fmt::Debug;
use std::time::Duration;

/// Port for obtaining current wall-clock time.
///
/// Returns whole seconds since the Unix epoch so that persisted records are
/// comparable across processes sharing a store. All time-based transitions
/// (epoch expiry, cooldown) are evaluated lazily against this clock; there is
/// no background timer. Infrastructure provides `SystemClock` and, for tests,
/// `MockClock`.
pub trait Clock: Send + Sync + Debug {
    /// Current time, whole seconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// Failure of a store-facing call.
///
/// Always propagated explicitly; the engine never converts a store failure
/// into a benign decision without marking it. Callers applying a timeout to
/// store calls should surface the timeout as `Unavailable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or timed out
    Unavailable(String),
    /// A stored record could not be decoded
    Corrupt(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(detail) => write!(f, "store unavailable: {}", detail),
            StoreError::Corrupt(detail) => write!(f, "corrupt store record: {}", detail),
        }
    }
}

impl std::error::Error for StoreError {}

/// A breaker state together with the store version it was read at.
///
/// The version feeds [`RateLimitStore::save_breaker`]'s compare-and-swap:
/// a writer that read version `n` commits only if the state is still at `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedBreakerState {
    /// The persisted state
    pub state: CircuitBreakerState,
    /// Store version of this read
    pub version: u64,
}

/// Outcome of a compare-and-swap write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied
    Committed,
    /// Another writer got there first; nothing was written
    Conflict,
}

impl CasOutcome {
    /// Whether the write was applied.
    pub fn committed(&self) -> bool {
        matches!(self, CasOutcome::Committed)
    }
}

/// Port for the shared persistence backing budgets and breaker state.
///
/// # Atomicity requirements
///
/// - `increment_budget` must be atomic per key: concurrent increments for
///   the same key must all be counted (no lost updates), and the epoch
///   rollover must happen inside the same atomic section.
/// - `save_breaker` must be a compare-and-swap on the per-resource version:
///   of any set of concurrent writers that read the same version, exactly
///   one commits. This is what makes the Half-Open probe slot exclusive,
///   and it is a correctness requirement, not best-effort.
///
/// Eviction of long-idle records is a store-level policy and out of scope
/// for this contract.
pub trait RateLimitStore: Send + Sync + Debug {
    /// Atomically increment the budget for `key` and return the resulting
    /// record, starting or rolling the epoch as needed.
    fn increment_budget(
        &self,
        key: &str,
        epoch_duration: Duration,
    ) -> Result<BudgetRecord, StoreError>;

    /// Read the budget record for `key`, if one exists.
    fn get_budget(&self, key: &str) -> Result<Option<BudgetRecord>, StoreError>;

    /// Read the versioned breaker state for `resource`, if one exists.
    fn get_breaker(&self, resource: &str) -> Result<Option<VersionedBreakerState>, StoreError>;

    /// Compare-and-swap the breaker state for `resource`.
    ///
    /// `expected_version` is the version the writer read, or `None` to
    /// create the record only if it does not exist yet.
    fn save_breaker(
        &self,
        resource: &str,
        expected_version: Option<u64>,
        state: &CircuitBreakerState,
    ) -> Result<CasOutcome, StoreError>;
}

impl<T: RateLimitStore + ?Sized> RateLimitStore for std::sync::Arc<T> {
    fn increment_budget(
        &self,
        key: &str,
        epoch_duration: Duration,
    ) -> Result<BudgetRecord, StoreError> {
        (**self).increment_budget(key, epoch_duration)
    }

    fn get_budget(&self, key: &str) -> Result<Option<BudgetRecord>, StoreError> {
        (**self).get_budget(key)
    }

    fn get_breaker(&self, resource: &str) -> Result<Option<VersionedBreakerState>, StoreError> {
        (**self).get_breaker(resource)
    }

    fn save_breaker(
        &self,
        resource: &str,
        expected_version: Option<u64>,
        state: &CircuitBreakerState,
    ) -> Result<CasOutcome, StoreError> {
        (**self).save_breaker(resource, expected_version, state)
    }
}
