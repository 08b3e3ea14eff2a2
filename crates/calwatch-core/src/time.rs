//! Time helpers used by lease renewal scheduling.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Signed milliseconds from `now` until `target`. Negative when `target` is in the past.
pub fn millis_until_from(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (target - now).num_milliseconds()
}

/// Signed milliseconds from the current instant until `target`.
pub fn millis_until(target: DateTime<Utc>) -> i64 {
    millis_until_from(target, Utc::now())
}

/// Milliseconds until `expiration`, clamped at zero for already-expired timestamps.
pub fn timeout_ms(expiration: DateTime<Utc>) -> u64 {
    millis_until(expiration).max(0) as u64
}

/// Delay before a renewal should fire: `max(0, time_until_expiration - margin)`.
pub fn renewal_delay(expiration: DateTime<Utc>, margin: Duration) -> Duration {
    Duration::from_millis(timeout_ms(expiration)).saturating_sub(margin)
}

/// Parse a provider expiration value given as epoch milliseconds, e.g. `"1479344706000"`.
pub fn parse_epoch_millis(value: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = value.trim().parse().ok()?;
    DateTime::from_timestamp_millis(millis)
}
