//! Time utility functions

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Format a timestamp the way the Prometheus HTTP API accepts it:
/// Unix seconds with millisecond precision.
pub fn prometheus_timestamp(at: DateTime<Utc>) -> String {
    format!("{}.{:03}", at.timestamp(), at.timestamp_subsec_millis())
}

/// `now` shifted back by `offset`, saturating at the Unix epoch
pub fn offset_from(now: DateTime<Utc>, offset: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(offset)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .map(|at| at.max(DateTime::UNIX_EPOCH))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
