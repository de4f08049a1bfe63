//! Usage: Wall-clock helpers and reset-timestamp normalization.

use std::time::{SystemTime, UNIX_EPOCH};

/// Values above this are treated as Unix milliseconds (year 2286 in seconds).
const MILLIS_THRESHOLD: i64 = 10_000_000_000;

pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Normalize an upstream epoch value (seconds or milliseconds) to Unix seconds.
pub fn normalize_epoch(raw: i64) -> Option<i64> {
    if raw <= 0 {
        return None;
    }
    if raw >= MILLIS_THRESHOLD {
        return Some(raw / 1000);
    }
    Some(raw)
}

pub fn normalize_epoch_f64(raw: f64) -> Option<i64> {
    if !raw.is_finite() {
        return None;
    }
    normalize_epoch(raw.round() as i64)
}

/// Parse an RFC 3339 timestamp or a numeric epoch string into Unix seconds.
pub fn parse_reset_time(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return normalize_epoch(n);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return normalize_epoch(dt.timestamp());
    }
    // Date-only values such as Copilot's `quota_reset_date`.
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| normalize_epoch(dt.and_utc().timestamp()))
}
