//! Active timers of a runtime

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bpmn_marshal_schemas::TimerInstance;
use chrono::Duration;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Expiration, SessionClock, TimerError, Trigger};

/// Timer armed in the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTimer {
    pub timer: TimerInstance,
    pub trigger: Trigger,
}

/// Result of re-arming a persisted timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RearmOutcome {
    Armed { overdue: bool },
    /// A timer with the same id is already active; nothing changed
    AlreadyActive,
    /// The timer can never fire again and was not armed
    Exhausted,
    /// The persisted delay or period puts the next fire outside the date range; not armed
    OutOfRange,
}

/// Map of active timers keyed by timer-instance id
pub struct TimerManager {
    clock: Arc<dyn SessionClock>,
    active: RwLock<BTreeMap<String, ScheduledTimer>>,
}

impl TimerManager {
    pub fn new(clock: Arc<dyn SessionClock>) -> Self {
        Self {
            clock,
            active: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn SessionClock> {
        &self.clock
    }

    /// Arm a new timer for `expiration`, starting now
    ///
    /// Fails when the first fire time falls outside the representable date range.
    pub fn schedule(
        &self,
        timer_id: impl Into<String>,
        process_instance_id: impl Into<String>,
        node_instance_id: Option<String>,
        expiration: &Expiration,
    ) -> Result<TimerInstance, TimerError> {
        let now = self.clock.now();
        let trigger = Trigger::from_expiration(expiration, now)?;
        let (delay_ms, period_ms, repeat_limit) = match *expiration {
            Expiration::After { delay_ms } => (delay_ms, 0, None),
            Expiration::Repeat {
                delay_ms,
                period_ms,
                limit,
            } => (delay_ms, period_ms, limit),
            Expiration::Exact { at } => ((at - now).num_milliseconds(), 0, None),
        };
        let timer = TimerInstance {
            id: Uuid::now_v7().to_string(),
            timer_id: timer_id.into(),
            process_instance_id: process_instance_id.into(),
            node_instance_id,
            delay_ms,
            period_ms,
            repeat_limit,
            activated_time: now,
            last_triggered: None,
            trigger_count: 0,
        };
        debug!(timer_instance_id = %timer.id, next = %trigger.next_fire_time(), "timer scheduled");
        self.active.write().insert(
            timer.id.clone(),
            ScheduledTimer {
                timer: timer.clone(),
                trigger,
            },
        );
        Ok(timer)
    }

    /// Re-arm a persisted timer; a no-op when its id is already active
    pub fn rearm(&self, timer: TimerInstance) -> RearmOutcome {
        let mut active = self.active.write();
        if active.contains_key(&timer.id) {
            debug!(timer_instance_id = %timer.id, "timer already active, skipping re-arm");
            return RearmOutcome::AlreadyActive;
        }
        if timer.is_exhausted() {
            debug!(timer_instance_id = %timer.id, "timer exhausted, not re-armed");
            return RearmOutcome::Exhausted;
        }
        let Some(trigger) = Trigger::for_timer(&timer, self.clock.now()) else {
            warn!(
                timer_instance_id = %timer.id,
                delay_ms = timer.delay_ms,
                period_ms = timer.period_ms,
                "timer fire time out of range, not re-armed"
            );
            return RearmOutcome::OutOfRange;
        };
        let overdue = trigger.is_overdue();
        if overdue {
            info!(
                timer_instance_id = %timer.id,
                process_instance_id = %timer.process_instance_id,
                "timer overdue after restore, firing immediately"
            );
        }
        active.insert(timer.id.clone(), ScheduledTimer { timer, trigger });
        RearmOutcome::Armed { overdue }
    }

    pub fn cancel(&self, timer_instance_id: &str) -> Option<ScheduledTimer> {
        self.active.write().remove(timer_instance_id)
    }

    pub fn get(&self, timer_instance_id: &str) -> Option<ScheduledTimer> {
        self.active.read().get(timer_instance_id).cloned()
    }

    pub fn is_active(&self, timer_instance_id: &str) -> bool {
        self.active.read().contains_key(timer_instance_id)
    }

    /// Active timers whose fire time is at or before now, in fire-time order
    pub fn due(&self) -> Vec<ScheduledTimer> {
        let now = self.clock.now();
        let mut due: Vec<_> = self
            .active
            .read()
            .values()
            .filter(|s| s.trigger.next_fire_time() <= now)
            .cloned()
            .collect();
        due.sort_by_key(|s| s.trigger.next_fire_time());
        due
    }

    /// Record one fire of a timer and advance or retire its trigger
    ///
    /// Returns the updated timer instance, or `None` if the id is not active.
    pub fn fire(&self, timer_instance_id: &str) -> Option<TimerInstance> {
        let now = self.clock.now();
        let mut active = self.active.write();
        let scheduled = active.get_mut(timer_instance_id)?;
        scheduled.timer.last_triggered = Some(now);
        scheduled.timer.trigger_count += 1;
        let timer = scheduled.timer.clone();
        match scheduled.trigger.after_fire(now) {
            Some(next) => scheduled.trigger = next,
            None => {
                active.remove(timer_instance_id);
            }
        }
        Some(timer)
    }

    /// Active timers belonging to a process instance, by id
    pub fn timers_for(&self, process_instance_id: &str) -> BTreeMap<String, TimerInstance> {
        self.active
            .read()
            .values()
            .filter(|s| s.timer.process_instance_id == process_instance_id)
            .map(|s| (s.timer.id.clone(), s.timer.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.read().is_empty()
    }

    /// Time until the earliest active timer, if any
    pub fn time_to_next(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.active
            .read()
            .values()
            .map(|s| s.trigger.next_fire_time())
            .min()
            .map(|next| (next - now).max(Duration::zero()))
    }
}

impl fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager")
            .field("active", &self.active.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
