//! Timestamp source for `last_modified`
//!
//! Local writes are stamped by a hybrid clock: the wall clock, pushed forward
//! past every stamp already issued and every remote stamp the replica has
//! acknowledged. A sync cursor taken from any observed stamp therefore never
//! hides a later local write.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::types::Timestamp;

/// Physical time source
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock for tests and benches
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_millis(&self) -> Timestamp {
        (**self).now_millis()
    }
}

/// Monotonic stamp issuer layered over a physical clock
pub struct HybridClock {
    physical: Arc<dyn Clock>,
    last: AtomicI64,
}

impl HybridClock {
    pub fn new(physical: Arc<dyn Clock>) -> Self {
        Self {
            physical,
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Issue a stamp strictly greater than any previously issued or observed one
    pub fn tick(&self) -> Timestamp {
        let wall = self.physical.now_millis();
        let mut current = self.last.load(Ordering::SeqCst);
        loop {
            let next = if current == i64::MIN {
                wall
            } else {
                wall.max(current.saturating_add(1))
            };
            match self
                .last
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Current physical time, without issuing a stamp
    pub fn wall(&self) -> Timestamp {
        self.physical.now_millis()
    }

    /// Record a stamp seen elsewhere (remote acknowledgement, pulled record)
    pub fn observe(&self, timestamp: Timestamp) {
        self.last.fetch_max(timestamp, Ordering::SeqCst);
    }

    /// Highest stamp issued or observed so far
    pub fn high_water(&self) -> Option<Timestamp> {
        match self.last.load(Ordering::SeqCst) {
            i64::MIN => None,
            ts => Some(ts),
        }
    }
}

impl std::fmt::Debug for HybridClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridClock")
            .field("last", &self.high_water())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_follows_wall_clock() {
        let manual = Arc::new(ManualClock::new(100));
        let clock = HybridClock::new(manual.clone());
        assert_eq!(clock.tick(), 100);
        manual.set(250);
        assert_eq!(clock.tick(), 250);
    }

    #[test]
    fn test_tick_strictly_increases_when_wall_clock_stalls() {
        let manual = Arc::new(ManualClock::new(100));
        let clock = HybridClock::new(manual.clone());
        assert_eq!(clock.tick(), 100);
        assert_eq!(clock.tick(), 101);
        manual.set(50);
        assert_eq!(clock.tick(), 102);
    }

    #[test]
    fn test_observe_pushes_clock_forward() {
        let manual = Arc::new(ManualClock::new(100));
        let clock = HybridClock::new(manual);
        clock.observe(5_000);
        assert_eq!(clock.tick(), 5_001);
        clock.observe(10);
        assert_eq!(clock.high_water(), Some(5_001));
    }
}
