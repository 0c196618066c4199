//! Per-key budget tracking over the store port.
//!
//! The tracker enforces a rolling daily quota per limiter key. It holds no
//! counters itself; the store provides atomic increment-and-read, and expiry
//! is evaluated lazily against the injected clock.

use crate::application::ports::{Clock, RateLimitStore, StoreError};
use crate::domain::budget::{BudgetRecord, EPOCH_DURATION};
use crate::domain::context::LimiterKey;
use std::sync::Arc;

/// Rolling-epoch quota counter for arbitrary limiter keys.
///
/// Safe to share across request handlers: the tracker is stateless and the
/// store guarantees per-key atomicity.
#[derive(Debug, Clone)]
pub struct BudgetTracker<S>
where
    S: RateLimitStore + Clone,
{
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S> BudgetTracker<S>
where
    S: RateLimitStore + Clone,
{
    /// Create a tracker over a store and clock.
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count one request against `key`, starting or rolling the epoch as
    /// needed.
    ///
    /// Called by the caller after the protected operation, not by
    /// [`decide`](crate::application::engine::AbuseDecisionEngine::decide);
    /// the read path stays idempotent.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn increment(&self, key: &LimiterKey) -> Result<BudgetRecord, StoreError> {
        self.store
            .increment_budget(&key.to_string(), EPOCH_DURATION)
    }

    /// Whether `key` has spent its budget.
    ///
    /// True only if the stored count has reached `limit` **and** the record's
    /// epoch has not yet expired; an expired record reads as not-exceeded
    /// regardless of its stale count.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn is_exceeded(&self, key: &LimiterKey, limit: u64) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let record = self.store.get_budget(&key.to_string())?;

        Ok(match record {
            Some(record) => record.effective_count(now) >= limit,
            None => false,
        })
    }

    /// Read-only introspection for diagnostics.
    ///
    /// Returns a zero-valued record (epoch starting now) when the key has no
    /// stored budget.
    ///
    /// # Errors
    /// Propagates [`StoreError`] unmasked.
    pub fn status(&self, key: &LimiterKey) -> Result<BudgetRecord, StoreError> {
        let record = self.store.get_budget(&key.to_string())?;
        Ok(record.unwrap_or_else(|| BudgetRecord::starting_at(self.clock.now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use crate::infrastructure::store::InMemoryStore;
    use std::net::IpAddr;

    fn tracker(start: u64) -> (BudgetTracker<Arc<InMemoryStore>>, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(start));
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        (BudgetTracker::new(store, clock.clone()), clock)
    }

    fn ip_key() -> LimiterKey {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        LimiterKey::ip(addr)
    }

    #[test]
    fn test_unknown_key_is_not_exceeded() {
        let (tracker, _clock) = tracker(1_000);
        assert!(!tracker.is_exceeded(&ip_key(), 1).unwrap());
    }

    #[test]
    fn test_exceeds_at_limit() {
        let (tracker, _clock) = tracker(1_000);
        let key = ip_key();

        for _ in 0..4 {
            tracker.increment(&key).unwrap();
        }
        assert!(!tracker.is_exceeded(&key, 5).unwrap());

        tracker.increment(&key).unwrap();
        assert!(tracker.is_exceeded(&key, 5).unwrap());
    }

    #[test]
    fn test_expired_record_reads_as_empty() {
        let (tracker, clock) = tracker(1_000);
        let key = ip_key();

        for _ in 0..10 {
            tracker.increment(&key).unwrap();
        }
        assert!(tracker.is_exceeded(&key, 5).unwrap());

        // Just before the epoch boundary the record still counts
        clock.advance(std::time::Duration::from_secs(86_399));
        assert!(tracker.is_exceeded(&key, 5).unwrap());

        // At the boundary the stale count no longer matters
        clock.advance(std::time::Duration::from_secs(1));
        assert!(!tracker.is_exceeded(&key, 5).unwrap());
    }

    #[test]
    fn test_increment_after_expiry_starts_fresh_epoch() {
        let (tracker, clock) = tracker(1_000);
        let key = ip_key();

        for _ in 0..10 {
            tracker.increment(&key).unwrap();
        }

        clock.advance(std::time::Duration::from_secs(90_000));
        let record = tracker.increment(&key).unwrap();

        assert_eq!(record.count, 1);
        assert_eq!(record.epoch_start, 91_000);
    }

    #[test]
    fn test_status_defaults_to_zero() {
        let (tracker, _clock) = tracker(1_000);
        let record = tracker.status(&ip_key()).unwrap();

        assert_eq!(record.count, 0);
        assert_eq!(record.epoch_start, 1_000);
    }

    #[test]
    fn test_keys_are_independent() {
        let (tracker, _clock) = tracker(1_000);
        let ip = ip_key();
        let account = LimiterKey::account("42");

        tracker.increment(&ip).unwrap();
        tracker.increment(&ip).unwrap();
        tracker.increment(&account).unwrap();

        assert_eq!(tracker.status(&ip).unwrap().count, 2);
        assert_eq!(tracker.status(&account).unwrap().count, 1);
    }
}
