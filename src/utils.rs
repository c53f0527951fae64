//! Utility functions shared across the codebase

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

pub const MS_PER_HOUR: u64 = 3_600_000;

/// Get current time in milliseconds since Unix epoch
/// Returns 0 if system time is before Unix epoch (fallback behavior)
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_millis(0))
        .as_millis() as u64
}

/// Convert a millisecond timestamp into a UTC date for reports.
pub fn ms_to_utc(ms: u64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(i64::try_from(ms).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_ms_to_utc() {
        let date = ms_to_utc(0).unwrap();
        assert_eq!(date.timestamp(), 0);
        assert!(ms_to_utc(u64::MAX).is_none());
    }
}
