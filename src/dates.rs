//! Lenient timestamp parsing and canonical formatting.
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Parse a timestamp as sent by either remote system.
///
/// Accepts RFC 3339, naive date-times (interpreted as UTC) and bare dates.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical destination format: RFC 3339 UTC with millisecond precision.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize a raw timestamp into the canonical format, or `None` when it
/// is absent or unparseable.
pub fn normalize(raw: Option<&str>) -> Option<String> {
    raw.and_then(parse_timestamp).map(|dt| format_timestamp(&dt))
}

/// Whole days elapsed between `then` and `now`, floored.
pub fn days_old(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
    (now - then).num_seconds().div_euclid(86_400)
}

/// Instant before which a record counts as older than `days` days.
pub fn cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

/// Strict: a record exactly at the cutoff is not past it.
pub fn is_past_cutoff(date: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    date < cutoff
}
