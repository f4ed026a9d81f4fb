//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current wall clock as Unix milliseconds
pub fn now_unix_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert Unix milliseconds back to a UTC timestamp
///
/// Out-of-range values clamp to the Unix epoch rather than panic; callers
/// treat such timestamps as expired.
pub fn unix_ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Whole minutes elapsed since the given Unix-millisecond timestamp
///
/// Returns 0 for timestamps in the future.
pub fn minutes_since(unix_ms: i64) -> i64 {
    let elapsed_ms = now_unix_ms() - unix_ms;
    if elapsed_ms <= 0 {
        0
    } else {
        elapsed_ms / 60_000
    }
}

/// Format a date as DD.MM.YYYY, the display format used in issue titles
/// and extracted conversation dates
pub fn format_date_dmy(ts: DateTime<Utc>) -> String {
    ts.format("%d.%m.%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_unix_ms_round_trip() {
        let ms = now_unix_ms();
        let ts = unix_ms_to_datetime(ms);
        assert_eq!(ts.timestamp_millis(), ms);
    }

    #[test]
    fn test_unix_ms_out_of_range_clamps_to_epoch() {
        let ts = unix_ms_to_datetime(i64::MAX);
        assert_eq!(ts.timestamp_millis(), 0);
    }

    #[test]
    fn test_minutes_since_past_timestamp() {
        let past = now() - Duration::minutes(16);
        assert_eq!(minutes_since(past.timestamp_millis()), 16);
    }

    #[test]
    fn test_minutes_since_future_timestamp_is_zero() {
        let future = now() + Duration::minutes(5);
        assert_eq!(minutes_since(future.timestamp_millis()), 0);
    }

    #[test]
    fn test_minutes_since_sub_minute_elapsed_is_zero() {
        let recent = now() - Duration::seconds(30);
        assert_eq!(minutes_since(recent.timestamp_millis()), 0);
    }

    #[test]
    fn test_format_date_dmy() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 7, 14, 30, 0).unwrap();
        assert_eq!(format_date_dmy(ts), "07.03.2025");
    }
}
