//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert seconds since the Unix epoch to a UTC timestamp.
///
/// Returns `None` for values outside chrono's representable range.
pub fn epoch_to_utc(epoch_secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(epoch_secs, 0).single()
}

/// Format an epoch-seconds value the way ledger projections display it.
///
/// Out-of-range values fall back to the raw number so one corrupted
/// `epoch_time` never poisons an otherwise valid projection.
pub fn format_epoch(epoch_secs: i64) -> String {
    match epoch_to_utc(epoch_secs) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch_secs.to_string(),
    }
}
