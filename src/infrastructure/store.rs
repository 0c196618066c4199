//! In-memory store implementation.
//!
//! Reference implementation of the store port for single-process deployments
//! and tests. Budgets and breaker states live in DashMaps; per-key atomicity
//! comes from DashMap's entry locking, and breaker writes carry an explicit
//! version for compare-and-swap semantics identical to the distributed
//! backend's.

use crate::application::ports::{
    CasOutcome, Clock, RateLimitStore, StoreError, VersionedBreakerState,
};
use crate::domain::breaker::CircuitBreakerState;
use crate::domain::budget::BudgetRecord;
use crate::infrastructure::clock::SystemClock;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe in-memory store backed by DashMap.
///
/// DashMap provides lock-free reads and fine-grained locking for writes,
/// which is all the atomicity the store contract asks for in one process.
///
/// The store carries its own clock: epoch rollover has to happen inside the
/// per-key atomic section, so the store is the one that stamps it.
#[derive(Debug)]
pub struct InMemoryStore {
    budgets: DashMap<String, BudgetRecord>,
    breakers: DashMap<String, VersionedBreakerState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create an empty store on a caller-supplied clock.
    ///
    /// Tests share one mock clock between the store and the components
    /// reading from it so that epoch accounting lines up.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            budgets: DashMap::new(),
            breakers: DashMap::new(),
            clock,
        }
    }

    /// Number of tracked budget keys.
    pub fn budget_count(&self) -> usize {
        self.budgets.len()
    }

    /// Number of tracked breaker resources.
    pub fn breaker_count(&self) -> usize {
        self.breakers.len()
    }

    /// Drop all records. Primarily useful for tests.
    pub fn clear(&self) {
        self.budgets.clear();
        self.breakers.clear();
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitStore for InMemoryStore {
    fn increment_budget(
        &self,
        key: &str,
        _epoch_duration: Duration,
    ) -> Result<BudgetRecord, StoreError> {
        let now = self.clock.now();
        let mut entry = self
            .budgets
            .entry(key.to_string())
            .or_insert_with(|| BudgetRecord::starting_at(now));
        entry.apply_increment(now);
        Ok(*entry)
    }

    fn get_budget(&self, key: &str) -> Result<Option<BudgetRecord>, StoreError> {
        Ok(self.budgets.get(key).map(|record| *record))
    }

    fn get_breaker(&self, resource: &str) -> Result<Option<VersionedBreakerState>, StoreError> {
        Ok(self.breakers.get(resource).map(|entry| entry.clone()))
    }

    fn save_breaker(
        &self,
        resource: &str,
        expected_version: Option<u64>,
        state: &CircuitBreakerState,
    ) -> Result<CasOutcome, StoreError> {
        match self.breakers.entry(resource.to_string()) {
            Entry::Occupied(mut occupied) => {
                if expected_version == Some(occupied.get().version) {
                    let next = occupied.get().version + 1;
                    occupied.insert(VersionedBreakerState {
                        state: state.clone(),
                        version: next,
                    });
                    Ok(CasOutcome::Committed)
                } else {
                    Ok(CasOutcome::Conflict)
                }
            }
            Entry::Vacant(vacant) => {
                if expected_version.is_none() {
                    vacant.insert(VersionedBreakerState {
                        state: state.clone(),
                        version: 1,
                    });
                    Ok(CasOutcome::Committed)
                } else {
                    Ok(CasOutcome::Conflict)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::budget::EPOCH_DURATION;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_increment_creates_and_accumulates() {
        let store = InMemoryStore::new();

        let record = store.increment_budget("ip:1.2.3.4", EPOCH_DURATION).unwrap();
        assert_eq!(record.count, 1);

        let record = store.increment_budget("ip:1.2.3.4", EPOCH_DURATION).unwrap();
        assert_eq!(record.count, 2);

        assert_eq!(store.budget_count(), 1);
    }

    #[test]
    fn test_get_budget_missing_key() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_budget("ip:9.9.9.9").unwrap(), None);
    }

    #[test]
    fn test_concurrent_increments_lose_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    store.increment_budget("account:42", EPOCH_DURATION).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let record = store.get_budget("account:42").unwrap().unwrap();
        assert_eq!(record.count, 800);
    }

    #[test]
    fn test_breaker_create_requires_absent() {
        let store = InMemoryStore::new();
        let state = CircuitBreakerState::new();

        assert_eq!(
            store.save_breaker("login", None, &state).unwrap(),
            CasOutcome::Committed
        );
        // A second create loses
        assert_eq!(
            store.save_breaker("login", None, &state).unwrap(),
            CasOutcome::Conflict
        );
    }

    #[test]
    fn test_breaker_cas_on_version() {
        let store = InMemoryStore::new();
        let state = CircuitBreakerState::new();
        store.save_breaker("login", None, &state).unwrap();

        let versioned = store.get_breaker("login").unwrap().unwrap();
        assert_eq!(versioned.version, 1);

        // Write at the read version commits and bumps it
        assert_eq!(
            store
                .save_breaker("login", Some(versioned.version), &state)
                .unwrap(),
            CasOutcome::Committed
        );

        // A second write at the stale version conflicts
        assert_eq!(
            store
                .save_breaker("login", Some(versioned.version), &state)
                .unwrap(),
            CasOutcome::Conflict
        );
    }

    #[test]
    fn test_concurrent_cas_single_winner() {
        let store = Arc::new(InMemoryStore::new());
        let state = CircuitBreakerState::new();
        store.save_breaker("login", None, &state).unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let state = state.clone();
            handles.push(thread::spawn(move || {
                store.save_breaker("login", Some(1), &state).unwrap()
            }));
        }

        let outcomes: Vec<CasOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let committed = outcomes.iter().filter(|o| o.committed()).count();
        assert_eq!(committed, 1, "exactly one writer may win a version");
    }

    #[test]
    fn test_clear() {
        let store = InMemoryStore::new();
        store.increment_budget("ip:1.2.3.4", EPOCH_DURATION).unwrap();
        store
            .save_breaker("login", None, &CircuitBreakerState::new())
            .unwrap();

        store.clear();

        assert_eq!(store.budget_count(), 0);
        assert_eq!(store.breaker_count(), 0);
    }
}
