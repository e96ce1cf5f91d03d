use chrono::{DateTime, Utc};

/// Formats a timestamp as an RFC 1123 date, e.g. `Sun, 18 Oct 2026 09:30:00 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Current time as an RFC 1123 date.
pub fn now() -> String {
    http_date(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_rfc1123() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 3).unwrap();
        assert_eq!(http_date(at), "Sun, 18 Oct 2026 09:05:03 GMT");
    }
}
