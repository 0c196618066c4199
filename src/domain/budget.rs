//! Per-key epoch budget records.
//!
//! A budget counts requests against a rolling 24-hour epoch. Expiry is lazy:
//! a record whose epoch has passed is treated as empty wherever it is read,
//! and physically reset the next time the key is incremented. No background
//! sweep exists or is needed.

use std::time::Duration;

#[cfg(feature = "redis-storage")]
use serde::{Deserialize, Serialize};

/// Length of the budget accounting window.
///
/// A policy constant rather than a per-call parameter so that accounting
/// windows are comparable across keys.
pub const EPOCH_DURATION: Duration = Duration::from_secs(86_400);

/// Persisted counter state for one limiter key.
///
/// Invariant: `epoch_start` is the start of the window in which `count` was
/// accumulated. Once `now >= epoch_start + EPOCH_DURATION` the record is
/// logically expired and reads as `count = 0` even if the stored value has
/// not been reset yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "redis-storage", derive(Serialize, Deserialize))]
pub struct BudgetRecord {
    /// Requests counted in the current epoch
    pub count: u64,
    /// Start of the epoch, whole seconds since the Unix epoch
    pub epoch_start: u64,
}

impl BudgetRecord {
    /// A fresh record starting its epoch at `now`.
    pub fn starting_at(now: u64) -> Self {
        Self {
            count: 0,
            epoch_start: now,
        }
    }

    /// Whether this record's epoch has passed at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.epoch_start + EPOCH_DURATION.as_secs()
    }

    /// The count this record contributes at `now`: zero once expired.
    pub fn effective_count(&self, now: u64) -> u64 {
        if self.is_expired(now) {
            0
        } else {
            self.count
        }
    }

    /// Apply one increment at `now`, rolling the epoch over first if it has
    /// expired.
    ///
    /// Store implementations call this inside their per-key atomic section;
    /// the atomicity itself is the store's responsibility.
    pub fn apply_increment(&mut self, now: u64) {
        if self.is_expired(now) {
            *self = Self::starting_at(now);
        }
        self.count += 1;
    }
}
