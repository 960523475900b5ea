//! Parsers for duration, date and repeating-interval strings
//!
//! Durations: ISO-8601 (`PT5S`, `P1DT2H`, `P2W`, `PT0.5S`), the compact
//! expression form (`1d2h30m5s250ms`) or bare milliseconds.
//! Dates: RFC 3339, or a naive ISO date-time read as UTC.
//! Repeating intervals: `R[n]/duration`, `R[n]/start/duration`, `R[n]/duration/end`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use super::TimerError;

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Parse a duration string to milliseconds
pub fn parse_duration(input: &str) -> Result<i64, TimerError> {
    let s = input.trim();
    let invalid = || TimerError::InvalidDuration(input.to_string());
    if s.is_empty() {
        return Err(invalid());
    }
    if let Some(rest) = s.strip_prefix('P').or_else(|| s.strip_prefix('p')) {
        return parse_iso_duration(rest).ok_or_else(invalid);
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().map_err(|_| invalid());
    }
    parse_compact_duration(s).ok_or_else(invalid)
}

/// ISO-8601 duration body after the leading `P`
fn parse_iso_duration(body: &str) -> Option<i64> {
    let (date_part, time_part) = match body.find(['T', 't']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };
    if date_part.is_empty() && time_part.map_or(true, str::is_empty) {
        return None;
    }

    let mut total = 0i64;
    for (value, unit) in iso_components(date_part)? {
        let scale = match unit {
            'W' => WEEK,
            'D' => DAY,
            // Calendar years and months have no fixed length
            _ => return None,
        };
        total = total.checked_add(scale_fraction(value, scale)?)?;
    }
    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return None;
        }
        for (value, unit) in iso_components(time_part)? {
            let scale = match unit {
                'H' => HOUR,
                'M' => MINUTE,
                'S' => SECOND,
                _ => return None,
            };
            total = total.checked_add(scale_fraction(value, scale)?)?;
        }
    }
    Some(total)
}

/// Split `1D2H` style text into (number, upper-case unit) pairs
fn iso_components(text: &str) -> Option<Vec<(&str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c.is_ascii_alphabetic() {
            let value = &text[start..i];
            if value.is_empty() {
                return None;
            }
            out.push((value, c.to_ascii_uppercase()));
            start = i + c.len_utf8();
        } else if !(c.is_ascii_digit() || c == '.' || c == ',') {
            return None;
        }
    }
    if start != text.len() {
        return None;
    }
    Some(out)
}

/// `value` (possibly fractional) times `scale`, truncated to whole milliseconds
fn scale_fraction(value: &str, scale: i64) -> Option<i64> {
    let value = value.replace(',', ".");
    match value.split_once('.') {
        None => value.parse::<i64>().ok()?.checked_mul(scale),
        Some((whole, frac)) => {
            let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().ok()? };
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // Keep up to nine fractional digits, enough for any unit down to ms
            let digits = &frac[..frac.len().min(9)];
            let denom = 10i64.pow(digits.len() as u32);
            let frac = digits.parse::<i64>().ok()?;
            let frac_ms = (i128::from(frac) * i128::from(scale) / i128::from(denom)) as i64;
            whole.checked_mul(scale)?.checked_add(frac_ms)
        }
    }
}

/// `1d2h30m5s250ms`, units in any order, case-insensitive
fn parse_compact_duration(text: &str) -> Option<i64> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut total = 0i64;
    let mut i = 0;
    let mut matched = false;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i == bytes.len() {
            break;
        }
        let num_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if num_start == i {
            return None;
        }
        let value: i64 = lower[num_start..i].parse().ok()?;
        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let scale = match &lower[unit_start..i] {
            "d" => DAY,
            "h" => HOUR,
            "m" => MINUTE,
            "s" => SECOND,
            "ms" => 1,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(scale)?)?;
        matched = true;
    }
    matched.then_some(total)
}

/// Parse an absolute date-time
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, TimerError> {
    let s = input.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(TimerError::InvalidDate(input.to_string()))
}

/// Resolved ISO-8601 repeating interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatingInterval {
    /// `None` repeats forever
    pub repeat_count: Option<u32>,
    pub delay_ms: i64,
    pub period_ms: i64,
}

/// Parse `R[n]/...` relative to `now`
///
/// - `R[n]/duration`: first fire after one period
/// - `R[n]/start/duration`: first fire at `start` (immediately if it passed)
/// - `R[n]/duration/end`: the last of `n` fires lands on `end`
pub fn parse_repeating_interval(
    input: &str,
    now: DateTime<Utc>,
) -> Result<RepeatingInterval, TimerError> {
    let invalid = || TimerError::InvalidCycle(input.to_string());
    let parts: Vec<&str> = input.trim().split('/').collect();
    let head = parts.first().copied().unwrap_or_default();
    let count = head
        .strip_prefix('R')
        .or_else(|| head.strip_prefix('r'))
        .ok_or_else(invalid)?;
    let repeat_count = if count.is_empty() || count == "-1" {
        None
    } else {
        Some(count.parse::<u32>().map_err(|_| invalid())?)
    };

    let is_duration = |s: &str| s.starts_with(['P', 'p']);
    let (delay_ms, period_ms) = match parts.as_slice() {
        [_, period] if is_duration(period) => {
            let period = parse_duration(period)?;
            (period, period)
        }
        [_, start, period] if is_duration(period) => {
            let start = parse_date(start)?;
            let period = parse_duration(period)?;
            ((start - now).num_milliseconds().max(0), period)
        }
        [_, period, end] if is_duration(period) => {
            let end = parse_date(end)?;
            let period = parse_duration(period)?;
            let fires = i64::from(repeat_count.unwrap_or(1).max(1));
            let span_ms = period.saturating_mul(fires - 1);
            let first = TimeDelta::try_milliseconds(span_ms)
                .and_then(|span| end.checked_sub_signed(span))
                .ok_or(TimerError::OutOfRange(span_ms))?;
            ((first - now).num_milliseconds().max(0), period)
        }
        _ => return Err(invalid()),
    };

    Ok(RepeatingInterval {
        repeat_count,
        delay_ms,
        period_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_iso_durations() {
        assert_eq!(parse_duration("PT5S"), Ok(5_000));
        assert_eq!(parse_duration("PT1H30M"), Ok(90 * MINUTE));
        assert_eq!(parse_duration("P1DT2H"), Ok(DAY + 2 * HOUR));
        assert_eq!(parse_duration("P2W"), Ok(2 * WEEK));
        assert_eq!(parse_duration("PT0.25S"), Ok(250));
        assert_eq!(parse_duration("PT1,5S"), Ok(1_500));
    }

    #[test]
    fn test_compact_and_bare_durations() {
        assert_eq!(parse_duration("1d2h30m5s250ms"), Ok(DAY + 2 * HOUR + 30 * MINUTE + 5_250));
        assert_eq!(parse_duration("10s"), Ok(10_000));
        assert_eq!(parse_duration("1500"), Ok(1_500));
        assert_eq!(parse_duration(" 2m 3s "), Ok(123_000));
    }

    #[test]
    fn test_invalid_durations() {
        for input in ["", "P", "PT", "P1Y", "PT5X", "abc", "5 parsecs", "1.5s"] {
            assert_eq!(
                parse_duration(input),
                Err(TimerError::InvalidDuration(input.to_string())),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_dates() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_date("2024-03-01T10:00:00Z"), Ok(expected));
        assert_eq!(parse_date("2024-03-01T11:00:00+01:00"), Ok(expected));
        assert_eq!(parse_date("2024-03-01T10:00:00"), Ok(expected));
        assert_eq!(parse_date("2024-03-01T10:00"), Ok(expected));
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_cycle_with_count() {
        let cycle = parse_repeating_interval("R3/PT10S", now()).unwrap();
        assert_eq!(
            cycle,
            RepeatingInterval {
                repeat_count: Some(3),
                delay_ms: 10_000,
                period_ms: 10_000,
            }
        );
    }

    #[test]
    fn test_unbounded_cycle() {
        let cycle = parse_repeating_interval("R/PT1M", now()).unwrap();
        assert_eq!(cycle.repeat_count, None);
        assert_eq!(cycle.period_ms, MINUTE);
    }

    #[test]
    fn test_cycle_with_start() {
        let cycle = parse_repeating_interval("R2/2024-01-01T12:05:00Z/PT1M", now()).unwrap();
        assert_eq!(cycle.delay_ms, 5 * MINUTE);
        assert_eq!(cycle.period_ms, MINUTE);

        let past = parse_repeating_interval("R2/2023-12-31T00:00:00Z/PT1M", now()).unwrap();
        assert_eq!(past.delay_ms, 0);
    }

    #[test]
    fn test_cycle_with_end() {
        // Three fires a minute apart ending at 12:10 start at 12:08
        let cycle = parse_repeating_interval("R3/PT1M/2024-01-01T12:10:00Z", now()).unwrap();
        assert_eq!(cycle.delay_ms, 8 * MINUTE);
        assert_eq!(cycle.repeat_count, Some(3));
    }

    #[test]
    fn test_invalid_cycles() {
        assert!(parse_repeating_interval("PT5S", now()).is_err());
        assert!(parse_repeating_interval("Rx/PT5S", now()).is_err());
        assert!(parse_repeating_interval("R3", now()).is_err());
        assert!(parse_repeating_interval("R3/PT5S/PT6S/PT7S", now()).is_err());
    }

    #[test]
    fn test_cycle_end_before_date_range() {
        let result = parse_repeating_interval("R4000000000/P100000D/2024-01-01T00:00:00Z", now());
        assert!(matches!(result, Err(TimerError::OutOfRange(_))));
    }
}
