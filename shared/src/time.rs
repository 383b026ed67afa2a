//! RFC 2822 / RFC 3339 (ISO-8601) timestamp helpers.

use chrono::{DateTime, Utc};

/// Formats a timestamp as RFC 2822, for use as an `If-Modified-Since` header.
pub fn to_rfc2822(dt: DateTime<Utc>) -> String {
    dt.to_rfc2822()
}

/// Parses a feed-level `updated` timestamp, trying RFC 2822 first (the
/// classic RSS form) and falling back to RFC 3339 / ISO-8601 (Atom).
pub fn parse_rfc2822_or_8601(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_rfc2822() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let formatted = to_rfc2822(dt);
        assert_eq!(parse_rfc2822_or_8601(&formatted).unwrap(), dt);
    }

    #[test]
    fn parses_rfc3339_fallback() {
        let parsed = parse_rfc2822_or_8601("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_rfc2822_or_8601("not a date").is_none());
    }
}
