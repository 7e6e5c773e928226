//! Time-related functions.

use std::time::SystemTime;

/// Get the current Unix timestamp, in nanoseconds.
///
/// Clocks set before the Unix epoch yield zero, and clocks set far enough in the future to overflow an `i64` (the year
/// 2262) saturate at `i64::MAX`.
pub fn unix_timestamp_nanos() -> i64 {
    let since_unix_epoch = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(since_unix_epoch.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::unix_timestamp_nanos;

    #[test]
    fn nanosecond_resolution() {
        // Anything after September 2001 has a 19 digit nanosecond timestamp.
        let now = unix_timestamp_nanos();
        assert_eq!(now.to_string().len(), 19);
        assert!(unix_timestamp_nanos() >= now);
    }
}
