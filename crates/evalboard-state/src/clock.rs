//! Monotonic creation-time clock.
//!
//! `created_at` is the only ordering key for snapshots, runs and evals, so
//! two records written in the same wall-clock tick must still compare
//! strictly. `MonotonicClock::now` never returns a value less than or equal
//! to the previous one.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Strictly increasing timestamp source.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time, bumped by one microsecond past the previous reading on ties.
    pub fn now(&self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    /// Fold an externally observed wall-clock reading into the sequence.
    pub fn observe(&self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = match *last {
            Some(prev) if wall <= prev => prev + Duration::microseconds(1),
            _ => wall,
        };
        *last = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_are_strictly_increasing() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn backwards_wall_clock_is_bumped_forward() {
        let clock = MonotonicClock::new();
        let t0 = Utc::now();
        let first = clock.observe(t0);
        let second = clock.observe(t0 - Duration::seconds(10));
        assert_eq!(first, t0);
        assert_eq!(second, t0 + Duration::microseconds(1));
    }
}
