//! Timer specifications and their expiration descriptors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use bpmn_marshal_schemas::add_millis;

use super::parse::{parse_date, parse_duration, parse_repeating_interval, RepeatingInterval};
use super::{SessionClock, TimerError};

/// Parse a duration whose offset from `now` stays inside the date range
fn offset_ms(text: &str, now: DateTime<Utc>) -> Result<i64, TimerError> {
    in_range(parse_duration(text)?, now)
}

fn in_range(ms: i64, now: DateTime<Utc>) -> Result<i64, TimerError> {
    add_millis(now, ms).map(|_| ms).ok_or(TimerError::OutOfRange(ms))
}

fn cycle_in_range(text: &str, now: DateTime<Utc>) -> Result<RepeatingInterval, TimerError> {
    let cycle = parse_repeating_interval(text, now)?;
    in_range(cycle.delay_ms, now)?;
    in_range(cycle.period_ms, now)?;
    Ok(cycle)
}

/// How a timer specification is to be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Plain duration, optionally with a period
    Duration,
    /// ISO repeating interval, or independent delay and period durations
    Cycle,
    /// Absolute date-time
    Date,
}

impl TimerKind {
    pub fn code(self) -> i32 {
        match self {
            Self::Duration => 1,
            Self::Cycle => 2,
            Self::Date => 3,
        }
    }
}

impl TryFrom<i32> for TimerKind {
    type Error = TimerError;

    fn try_from(code: i32) -> Result<Self, TimerError> {
        match code {
            1 => Ok(Self::Duration),
            2 => Ok(Self::Cycle),
            3 => Ok(Self::Date),
            other => Err(TimerError::UnsupportedKind(other)),
        }
    }
}

/// Timer definition as declared on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSpec {
    pub kind: TimerKind,
    /// Duration, or the whole ISO repeating interval for cycles
    pub delay: Option<String>,
    pub period: Option<String>,
    pub date: Option<String>,
}

impl TimerSpec {
    pub fn duration(delay: impl Into<String>) -> Self {
        Self {
            kind: TimerKind::Duration,
            delay: Some(delay.into()),
            period: None,
            date: None,
        }
    }

    pub fn cycle(delay: impl Into<String>) -> Self {
        Self {
            kind: TimerKind::Cycle,
            ..Self::duration(delay)
        }
    }

    pub fn date(date: impl Into<String>) -> Self {
        Self {
            kind: TimerKind::Date,
            delay: None,
            period: None,
            date: Some(date.into()),
        }
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = Some(period.into());
        self
    }

    fn delay_text(&self) -> Result<&str, TimerError> {
        self.delay.as_deref().ok_or(TimerError::MissingField("delay"))
    }

    /// Date for DATE timers; the delay field is accepted as a fallback
    fn date_text(&self) -> Result<&str, TimerError> {
        self.date
            .as_deref()
            .or(self.delay.as_deref())
            .ok_or(TimerError::MissingField("date"))
    }

    fn is_iso_cycle(text: &str) -> bool {
        text.trim_start().starts_with(['R', 'r'])
    }

    /// Strict check used before a definition is persisted
    ///
    /// Unlike [`to_expiration`], an unparsable cycle period is an error here.
    pub fn validate(&self) -> Result<(), TimerError> {
        let now = Utc::now();
        match self.kind {
            TimerKind::Duration => {
                offset_ms(self.delay_text()?, now)?;
                if let Some(period) = &self.period {
                    offset_ms(period, now)?;
                }
            }
            TimerKind::Cycle => {
                let delay = self.delay_text()?;
                if Self::is_iso_cycle(delay) {
                    cycle_in_range(delay, now)?;
                } else {
                    offset_ms(delay, now)?;
                    if let Some(period) = &self.period {
                        offset_ms(period, now)?;
                    }
                }
            }
            TimerKind::Date => {
                parse_date(self.date_text()?)?;
            }
        }
        Ok(())
    }
}

/// Schedulable form of a timer specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Fire once after `delay_ms`
    After { delay_ms: i64 },
    /// Fire after `delay_ms`, then every `period_ms`; `limit` bounds the number of fires
    Repeat {
        delay_ms: i64,
        period_ms: i64,
        limit: Option<u32>,
    },
    /// Fire once at an exact instant
    Exact { at: DateTime<Utc> },
}

/// Convert a timer specification to an expiration, relative to the session clock
///
/// For cycles whose period does not parse, the delay is used as the period.
pub fn to_expiration(spec: &TimerSpec, clock: &dyn SessionClock) -> Result<Expiration, TimerError> {
    let now = clock.now();
    match spec.kind {
        TimerKind::Duration => {
            let delay_ms = offset_ms(spec.delay_text()?, now)?;
            match spec.period.as_deref().filter(|p| !p.trim().is_empty()) {
                Some(period) => Ok(Expiration::Repeat {
                    delay_ms,
                    period_ms: offset_ms(period, now)?,
                    limit: None,
                }),
                None => Ok(Expiration::After { delay_ms }),
            }
        }
        TimerKind::Cycle => {
            let delay = spec.delay_text()?;
            if TimerSpec::is_iso_cycle(delay) {
                let cycle = cycle_in_range(delay, now)?;
                return Ok(Expiration::Repeat {
                    delay_ms: cycle.delay_ms,
                    period_ms: cycle.period_ms,
                    limit: cycle.repeat_count,
                });
            }
            let delay_ms = offset_ms(delay, now)?;
            let period_ms = match spec.period.as_deref() {
                Some(period) => match parse_duration(period) {
                    Ok(period_ms) => in_range(period_ms, now)?,
                    Err(e) => {
                        warn!(period, error = %e, "cycle period unparsable, using delay as period");
                        delay_ms
                    }
                },
                None => delay_ms,
            };
            Ok(Expiration::Repeat {
                delay_ms,
                period_ms,
                limit: None,
            })
        }
        TimerKind::Date => Ok(Expiration::Exact {
            at: parse_date(spec.date_text()?)?,
        }),
    }
}
