// Timer instance
//
// A timer owned by a process instance, in its already-resolved numeric form
// (expressions and ISO strings are parsed before a timer instance exists).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::add_millis;

/// Persisted state of one timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerInstance {
    /// Unique timer instance id (referenced from node instances and SLA fields)
    pub id: String,
    /// Id of the timer definition on the node
    pub timer_id: String,
    pub process_instance_id: String,
    pub node_instance_id: Option<String>,
    /// Delay before the first fire, in milliseconds
    pub delay_ms: i64,
    /// Repeat period in milliseconds; 0 for one-shot timers
    pub period_ms: i64,
    /// Maximum number of fires; `None` repeats forever
    pub repeat_limit: Option<u32>,
    /// When the timer was armed for the first time
    pub activated_time: DateTime<Utc>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub trigger_count: u32,
}

impl TimerInstance {
    /// Whether the timer fires more than once
    pub fn is_repeating(&self) -> bool {
        self.period_ms > 0
    }

    /// Whether the timer can never fire again
    pub fn is_exhausted(&self) -> bool {
        if self.last_triggered.is_some() && !self.is_repeating() {
            return true;
        }
        matches!(self.repeat_limit, Some(limit) if self.trigger_count >= limit)
    }

    /// Instant of the next fire according to persisted state alone
    ///
    /// Returns `None` for exhausted timers and for fire times outside the
    /// representable date range.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        if self.is_exhausted() {
            return None;
        }
        match self.last_triggered {
            Some(last) => add_millis(last, self.period_ms),
            None => add_millis(self.activated_time, self.delay_ms),
        }
    }

    /// Whether a live timer's next fire time cannot be represented
    pub fn is_out_of_range(&self) -> bool {
        !self.is_exhausted() && self.next_fire_time().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timer(delay_ms: i64, period_ms: i64) -> TimerInstance {
        TimerInstance {
            id: "t-1".into(),
            timer_id: "1".into(),
            process_instance_id: "pi-1".into(),
            node_instance_id: None,
            delay_ms,
            period_ms,
            repeat_limit: None,
            activated_time: Utc.timestamp_millis_opt(1_000_000).unwrap(),
            last_triggered: None,
            trigger_count: 0,
        }
    }

    #[test]
    fn test_first_fire_is_activation_plus_delay() {
        let t = timer(5_000, 0);
        assert_eq!(
            t.next_fire_time(),
            Some(Utc.timestamp_millis_opt(1_005_000).unwrap())
        );
    }

    #[test]
    fn test_repeating_fire_follows_last_trigger() {
        let mut t = timer(5_000, 1_000);
        t.last_triggered = Some(Utc.timestamp_millis_opt(2_000_000).unwrap());
        t.trigger_count = 1;
        assert_eq!(
            t.next_fire_time(),
            Some(Utc.timestamp_millis_opt(2_001_000).unwrap())
        );
    }

    #[test]
    fn test_fired_one_shot_is_exhausted() {
        let mut t = timer(5_000, 0);
        t.last_triggered = Some(Utc.timestamp_millis_opt(1_005_000).unwrap());
        t.trigger_count = 1;
        assert!(t.is_exhausted());
        assert_eq!(t.next_fire_time(), None);
    }

    #[test]
    fn test_repeat_limit_exhausts() {
        let mut t = timer(0, 1_000);
        t.repeat_limit = Some(3);
        t.trigger_count = 3;
        t.last_triggered = Some(Utc.timestamp_millis_opt(1_003_000).unwrap());
        assert!(t.is_exhausted());
    }

    #[test]
    fn test_oversized_delay_is_out_of_range() {
        let t = timer(i64::MAX, 0);
        assert_eq!(t.next_fire_time(), None);
        assert!(t.is_out_of_range());

        let mut fired = timer(5_000, 0);
        fired.last_triggered = Some(Utc.timestamp_millis_opt(1_005_000).unwrap());
        assert!(!fired.is_out_of_range());
    }
}
