//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds since the Unix epoch at which something stored at `from`
/// with the given retention expires
pub fn expiry_millis(from: DateTime<Utc>, retention: Duration) -> i64 {
    let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
    from.timestamp_millis().saturating_add(retention_ms)
}
