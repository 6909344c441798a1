//! Millisecond-since-epoch helpers.
//!
//! The unified schema timestamps everything in ms since the Unix epoch, UTC.
//! Centralizing the conversion avoids every adapter and the cleaner
//! re-deriving it slightly differently.

use chrono::{DateTime, TimeZone, Utc};

/// Current wall-clock time in ms since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts ms-since-epoch into a UTC `DateTime`. Returns `None` for values
/// outside the range `chrono` can represent.
pub fn from_ms(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// The cleaner's (§4.G) accepted timestamp window: `[2015-01-01, 2100-01-01)` UTC,
/// expressed in ms since epoch.
pub fn valid_timestamp_range_ms() -> std::ops::Range<i64> {
    // 2015-01-01T00:00:00Z and 2100-01-01T00:00:00Z
    1_420_070_400_000..4_102_444_800_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_excludes_pre_2015_and_post_2100() {
        let range = valid_timestamp_range_ms();
        assert!(!range.contains(&1_000_000_000_000)); // 2001
        assert!(range.contains(&1_700_000_000_000)); // 2023
        assert!(!range.contains(&4_200_000_000_000)); // 2103
    }
}
