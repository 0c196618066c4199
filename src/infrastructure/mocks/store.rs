//! Mock store for testing failure handling.

use crate::application::ports::{
    CasOutcome, RateLimitStore, StoreError, VersionedBreakerState,
};
use crate::domain::breaker::CircuitBreakerState;
use crate::domain::budget::BudgetRecord;
use std::time::Duration;

/// A store whose every call fails with [`StoreError::Unavailable`].
///
/// Used to test the fail-open/fail-closed degradation policies and the
/// propagation guarantees of the component APIs.
#[derive(Debug, Clone, Default)]
pub struct FailingStore;

impl FailingStore {
    /// Create a failing store.
    pub fn new() -> Self {
        Self
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("simulated outage".to_string())
    }
}

impl RateLimitStore for FailingStore {
    fn increment_budget(
        &self,
        _key: &str,
        _epoch_duration: Duration,
    ) -> Result<BudgetRecord, StoreError> {
        Err(Self::unavailable())
    }

    fn get_budget(&self, _key: &str) -> Result<Option<BudgetRecord>, StoreError> {
        Err(Self::unavailable())
    }

    fn get_breaker(&self, _resource: &str) -> Result<Option<VersionedBreakerState>, StoreError> {
        Err(Self::unavailable())
    }

    fn save_breaker(
        &self,
        _resource: &str,
        _expected_version: Option<u64>,
        _state: &CircuitBreakerState,
    ) -> Result<CasOutcome, StoreError> {
        Err(Self::unavailable())
    }
}
