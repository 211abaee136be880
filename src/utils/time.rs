use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Wall-clock milliseconds since the unix epoch.
///
/// TTL deadlines are persisted, so they use wall-clock time rather than a
/// monotonic clock. A clock set before the epoch reads as 0.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Absolute deadline `ttl` from `now_ms`, saturating on overflow.
pub fn deadline_millis(
    now_ms: u64,
    ttl: Duration,
) -> u64 {
    now_ms.saturating_add(ttl.as_millis().min(u64::MAX as u128) as u64)
}
