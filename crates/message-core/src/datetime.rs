//! Wire date encoding shared by CPIM, IMDN and the geolocation document
//!
//! Dates travel as `YYYY-MM-DDThh:mm:ssZ` and are handled internally as
//! milliseconds since the Unix epoch.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Encode a timestamp in milliseconds as a UTC date with second granularity
pub fn encode_date(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decode a wire date into milliseconds since the epoch
///
/// Accepts RFC 3339 dates (with or without fractional seconds, `Z` or a
/// numeric offset) and the bare `YYYY-MM-DDThh:mm:ss` form, read as UTC.
pub fn decode_date(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text.trim_end_matches('Z'), format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    None
}

/// Truncate a millisecond timestamp to whole seconds
pub fn truncate_to_seconds(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(1000) * 1000
}

/// Current wall-clock time in milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
