//! Schedulable triggers

use bpmn_marshal_schemas::{add_millis, TimerInstance};
use chrono::{DateTime, Utc};

use super::{Expiration, TimerError};

/// When a timer fires next, and how it continues afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fire once at `at`
    PointInTime { at: DateTime<Utc> },
    /// Fire at `next`, then every `period_ms`; `remaining` counts fires left including `next`
    Interval {
        next: DateTime<Utc>,
        period_ms: i64,
        remaining: Option<u32>,
    },
    /// A trigger whose fire time passed while the instance was persisted; fires at `at`
    Overdue { at: DateTime<Utc>, original: Box<Trigger> },
}

impl Trigger {
    /// Trigger for a freshly scheduled expiration
    pub fn from_expiration(
        expiration: &Expiration,
        now: DateTime<Utc>,
    ) -> Result<Trigger, TimerError> {
        let offset = |ms: i64| add_millis(now, ms).ok_or(TimerError::OutOfRange(ms));
        let trigger = match *expiration {
            Expiration::After { delay_ms } => Trigger::PointInTime {
                at: offset(delay_ms)?,
            },
            Expiration::Repeat {
                delay_ms,
                period_ms,
                limit,
            } => Trigger::Interval {
                next: offset(delay_ms)?,
                period_ms,
                remaining: limit,
            },
            Expiration::Exact { at } => Trigger::PointInTime { at },
        };
        Ok(trigger.overdue_at(now))
    }

    /// Trigger for a persisted timer
    ///
    /// `None` if it can never fire again or its next fire time is out of range.
    pub fn for_timer(timer: &TimerInstance, now: DateTime<Utc>) -> Option<Trigger> {
        let next = timer.next_fire_time()?;
        let trigger = if timer.is_repeating() {
            Trigger::Interval {
                next,
                period_ms: timer.period_ms,
                remaining: timer
                    .repeat_limit
                    .map(|limit| limit.saturating_sub(timer.trigger_count)),
            }
        } else {
            Trigger::PointInTime { at: next }
        };
        Some(trigger.overdue_at(now))
    }

    /// Wrap the trigger so it fires at `now` if its fire time already passed
    pub fn overdue_at(self, now: DateTime<Utc>) -> Trigger {
        if self.is_overdue() || self.next_fire_time() >= now {
            return self;
        }
        Trigger::Overdue {
            at: now,
            original: Box::new(self),
        }
    }

    pub fn next_fire_time(&self) -> DateTime<Utc> {
        match self {
            Trigger::PointInTime { at } | Trigger::Overdue { at, .. } => *at,
            Trigger::Interval { next, .. } => *next,
        }
    }

    pub fn is_overdue(&self) -> bool {
        matches!(self, Trigger::Overdue { .. })
    }

    /// Trigger after one fire at `fired_at`
    ///
    /// `None` when nothing is left or the following fire time is out of range.
    pub fn after_fire(&self, fired_at: DateTime<Utc>) -> Option<Trigger> {
        match self {
            Trigger::PointInTime { .. } => None,
            Trigger::Interval {
                period_ms,
                remaining,
                ..
            } => {
                let remaining = match remaining {
                    Some(n) if *n <= 1 => return None,
                    Some(n) => Some(n - 1),
                    None => None,
                };
                Some(Trigger::Interval {
                    next: add_millis(fired_at, *period_ms)?,
                    period_ms: *period_ms,
                    remaining,
                })
            }
            Trigger::Overdue { original, .. } => original.after_fire(fired_at),
        }
    }
}
