use chrono::{DateTime, Utc};

/// Current instant, formatted the way every persisted timestamp column is:
/// ISO-8601 UTC text.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

pub fn to_iso8601(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a persisted ISO-8601 string back to `DateTime<Utc>`.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let now = Utc::now();
        let s = to_iso8601(now);
        let back = parse_iso8601(&s).unwrap();
        assert_eq!(now.timestamp_millis(), back.timestamp_millis());
    }
}
