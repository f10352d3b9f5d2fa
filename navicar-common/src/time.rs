//! Timestamp utilities

use chrono::DateTime;

/// Parse an ISO-8601 / RFC 3339 timestamp into Unix epoch milliseconds.
///
/// Navidrome emits nanosecond precision (`2024-03-01T10:20:30.123456789Z`),
/// which RFC 3339 parsing accepts. Returns `None` for anything unparsable.
pub fn parse_epoch_millis(timestamp: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(timestamp.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}
