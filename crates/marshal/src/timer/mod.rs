//! Timer protocol
//!
//! - [`TimerSpec`] / [`to_expiration`]: turn a duration, ISO cycle or date
//!   specification into an [`Expiration`]
//! - [`Trigger`]: the schedulable form of an expiration or persisted timer,
//!   including the overdue wrapper used after a restart
//! - [`TimerManager`]: active timers of a runtime, re-armed idempotently

mod clock;
mod expiration;
mod manager;
mod parse;
mod trigger;

pub use clock::{PseudoClock, SessionClock, SystemClock};
pub use expiration::{to_expiration, Expiration, TimerKind, TimerSpec};
pub use manager::{RearmOutcome, ScheduledTimer, TimerManager};
pub use parse::{parse_date, parse_duration, parse_repeating_interval, RepeatingInterval};
pub use trigger::Trigger;

/// Errors from timer specification parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("invalid date '{0}'")]
    InvalidDate(String),

    #[error("invalid repeating interval '{0}'")]
    InvalidCycle(String),

    /// Required field of the specification is absent
    #[error("timer specification is missing {0}")]
    MissingField(&'static str),

    /// Offset that would move a fire time outside the representable date range
    #[error("timer offset of {0}ms is out of range")]
    OutOfRange(i64),

    /// Timer kind code not supported
    #[error("unsupported timer kind: {0}")]
    UnsupportedKind(i32),
}
