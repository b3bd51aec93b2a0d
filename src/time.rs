//! Time related utils.

use chrono::Utc;

/// DateTime in UTC, the only timezone the signer works in.
pub type DateTime = chrono::DateTime<Utc>;

/// Create a new DateTime of the current time.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format a DateTime into an http date, aka RFC 2822 with a literal `GMT` zone.
///
/// For example: `Sat, 01 Jan 2022 00:00:00 GMT`
pub fn format_http_date(t: DateTime) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Format a DateTime into a compact ISO 8601 timestamp.
///
/// For example: `20220101T000000Z`
pub fn format_iso8601(t: DateTime) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Format a DateTime into a date.
///
/// For example: `20220101`
pub fn format_date(t: DateTime) -> String {
    t.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime {
        Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_format_http_date() {
        assert_eq!(format_http_date(test_time()), "Sat, 01 Jan 2022 00:00:00 GMT");
    }

    #[test]
    fn test_format_iso8601() {
        assert_eq!(format_iso8601(test_time()), "20220101T000000Z");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(test_time()), "20220101");
    }
}
