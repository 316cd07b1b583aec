use chrono::{DateTime, Utc};

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Title of every status display
pub const STATUS_TITLE: &str = ":computer: Server Status";

/// Zero-width space. Chat platforms reject empty message content and
/// empty embed field names, so this stands in for "nothing".
pub const BLANK: &str = "\u{200b}";

/// Chat markup for a timestamp rendered relative to the reader ("2 minutes ago").
pub fn relative_timestamp(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

/// Chat markup for a country flag emoji from a lower-case alpha-2 code.
pub fn flag_emoji(country: &str) -> String {
    format!(":flag_{}:", country)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_relative_timestamp_uses_unix_seconds() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(relative_timestamp(at), "<t:1704067200:R>");
    }

    #[test]
    fn test_flag_emoji() {
        assert_eq!(flag_emoji("se"), ":flag_se:");
    }
}
