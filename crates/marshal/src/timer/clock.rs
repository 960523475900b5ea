//! Session clocks

use chrono::{DateTime, Duration, SubsecRound, Utc};
use parking_lot::Mutex;

/// Source of "now" for timer arithmetic
pub trait SessionClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock, at millisecond precision
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SessionClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct PseudoClock {
    now: Mutex<DateTime<Utc>>,
}

impl PseudoClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl SessionClock for PseudoClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pseudo_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = PseudoClock::new(start);
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));
    }
}
