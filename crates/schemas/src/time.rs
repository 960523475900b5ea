// Persisted time representation
//
// Every date is persisted as epoch milliseconds (UTC). Sub-millisecond
// precision does not survive a round trip.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

/// Convert a UTC date-time to epoch milliseconds
pub fn datetime_to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

/// Convert epoch milliseconds back to a UTC date-time
///
/// Returns `None` when the value is outside the range chrono can represent.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

/// `at` shifted by `millis`, or `None` when the result is not representable
pub fn add_millis(at: DateTime<Utc>, millis: i64) -> Option<DateTime<Utc>> {
    at.checked_add_signed(TimeDelta::try_milliseconds(millis)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_round_trip() {
        let at = millis_to_datetime(1_700_000_000_123).unwrap();
        assert_eq!(datetime_to_millis(at), 1_700_000_000_123);
    }

    #[test]
    fn test_sub_millisecond_precision_is_dropped() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let restored = millis_to_datetime(datetime_to_millis(at)).unwrap();
        assert_eq!(restored.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_out_of_range_millis() {
        assert!(millis_to_datetime(i64::MAX).is_none());
    }

    #[test]
    fn test_add_millis_overflow() {
        let at = millis_to_datetime(1_700_000_000_000).unwrap();
        assert_eq!(add_millis(at, 5).map(datetime_to_millis), Some(1_700_000_000_005));
        assert_eq!(add_millis(at, -5).map(datetime_to_millis), Some(1_699_999_999_995));
        assert!(add_millis(at, i64::MAX).is_none());
        assert!(add_millis(at, i64::MIN).is_none());
        assert!(add_millis(at, 8_640_000_000_000_000).is_none());
    }
}
