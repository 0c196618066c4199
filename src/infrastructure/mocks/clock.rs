//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling
/// deterministic testing of epoch expiry and cooldown transitions.
///
/// # Examples
///
/// ```
/// use abuse_guard::infrastructure::mocks::MockClock;
/// use abuse_guard::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::new(1_000);
/// assert_eq!(clock.now(), 1_000);
///
/// // Advance time explicitly
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), 1_010);
///
/// // Or set an absolute time
/// clock.set(2_000);
/// assert_eq!(clock.now(), 2_000);
/// ```
///
/// # Thread Safety
///
/// `MockClock` is thread-safe and can be cloned to share across threads.
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at `start` seconds since the Unix epoch.
    pub fn new(start: u64) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Advance the clock by a duration (whole seconds).
    pub fn advance(&self, duration: Duration) {
        self.current.fetch_add(duration.as_secs(), Ordering::SeqCst);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, now: u64) {
        self.current.store(now, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock() {
        let clock = MockClock::new(1_000);
        assert_eq!(clock.now(), 1_000);

        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now(), 1_010);

        clock.set(5_000);
        assert_eq!(clock.now(), 5_000);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = MockClock::new(0);
        let clone = clock.clone();

        clone.advance(Duration::from_secs(60));
        assert_eq!(clock.now(), 60);
    }
}
