//! Expiry of provider-signed URLs.
//!
//! Two encodings are understood:
//!
//! | Form | Parameters |
//! |---|---|
//! | Absolute | `Expires=<unix seconds>` (OSS v1, CloudFront, S3 v2) |
//! | Stamp + duration | `X-Amz-Date=20240101T000000Z` + `X-Amz-Expires=3600`, or the `x-oss-` equivalents |
//!
//! Anything else has no known expiry and is never proactively re-signed. So
//! is a stamp + duration whose sum falls outside the representable range.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use reqwest::Url;

/// Date stamp format used by SigV4-style signatures.
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Stamp/duration parameter pairs, checked in order.
const STAMP_PAIRS: &[(&str, &str)] = &[
    ("x-amz-date", "x-amz-expires"),
    ("x-oss-date", "x-oss-expires"),
];

/// Parse a reference's query string into `(name, value)` pairs.
///
/// Works for absolute URLs as well as relative paths and bare keys.
pub fn query_pairs(reference: &str) -> Vec<(String, String)> {
    let parsed = Url::parse(reference).or_else(|_| {
        Url::parse("http://reference.invalid/").and_then(|base| base.join(reference))
    });
    match parsed {
        Ok(url) => url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Embedded expiry of a signed URL, if one can be read.
pub fn parse_expiry(reference: &str) -> Option<DateTime<Utc>> {
    expiry_from_pairs(&query_pairs(reference))
}

pub(crate) fn expiry_from_pairs(pairs: &[(String, String)]) -> Option<DateTime<Utc>> {
    if let Some(secs) = lookup(pairs, "Expires").and_then(|v| v.trim().parse::<i64>().ok()) {
        if let Some(at) = Utc.timestamp_opt(secs, 0).single() {
            return Some(at);
        }
    }

    for (date_param, expires_param) in STAMP_PAIRS {
        let stamp = lookup(pairs, date_param)
            .and_then(|v| NaiveDateTime::parse_from_str(v.trim(), STAMP_FORMAT).ok());
        let valid_for = lookup(pairs, expires_param).and_then(|v| v.trim().parse::<i64>().ok());
        if let (Some(stamp), Some(secs)) = (stamp, valid_for) {
            return Duration::try_seconds(secs)
                .and_then(|valid_for| stamp.and_utc().checked_add_signed(valid_for));
        }
    }

    None
}

/// Whether an expiry is reached, counting `margin` ahead of `now`.
pub fn is_past(expiry: DateTime<Utc>, now: DateTime<Utc>, margin: Duration) -> bool {
    now.checked_add_signed(margin)
        .is_none_or(|horizon| horizon >= expiry)
}

/// Whether a signed URL's embedded expiry is within `margin` of `now`.
/// URLs without a readable expiry never expire.
pub fn is_expired(reference: &str, now: DateTime<Utc>, margin: Duration) -> bool {
    parse_expiry(reference).is_some_and(|expiry| is_past(expiry, now, margin))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn reads_unix_expires() {
        let url = "https://bucket.oss-cn-hangzhou.aliyuncs.com/a.png?OSSAccessKeyId=k&Expires=1700000000&Signature=abc";
        assert_eq!(parse_expiry(url), Some(at(1_700_000_000)));
    }

    #[test]
    fn reads_amz_stamp_and_duration() {
        let url = "https://b.s3.amazonaws.com/a.png?X-Amz-Date=20240101T000000Z&X-Amz-Expires=3600&X-Amz-Signature=f00";
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        assert_eq!(parse_expiry(url), Some(expected));
    }

    #[test]
    fn reads_oss_v4_stamp_and_duration() {
        let url = "https://b.oss-cn-beijing.aliyuncs.com/a.png?x-oss-date=20240301T120000Z&x-oss-expires=600&x-oss-signature=1";
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap();
        assert_eq!(parse_expiry(url), Some(expected));
    }

    #[test]
    fn parameter_names_are_case_insensitive() {
        let url = "https://b.s3.amazonaws.com/a.png?x-amz-date=20240101T000000Z&x-amz-expires=60";
        assert!(parse_expiry(url).is_some());
    }

    #[test]
    fn relative_and_bare_references_parse_queries() {
        assert_eq!(parse_expiry("images/a.png?Expires=100"), Some(at(100)));
        assert_eq!(parse_expiry("/images/a.png?Expires=100"), Some(at(100)));
    }

    #[test]
    fn unparseable_means_no_expiry() {
        assert_eq!(parse_expiry("https://example.com/a.png"), None);
        assert_eq!(parse_expiry("https://example.com/a.png?Expires=soon"), None);
        assert_eq!(
            parse_expiry("https://b.s3.amazonaws.com/a.png?X-Amz-Date=yesterday&X-Amz-Expires=60"),
            None
        );
        assert_eq!(
            parse_expiry("https://b.s3.amazonaws.com/a.png?X-Amz-Date=20240101T000000Z"),
            None
        );
    }

    #[test]
    fn expiry_applies_margin() {
        let url = "a.png?Expires=1000";
        let margin = Duration::seconds(60);
        assert!(!is_expired(url, at(939), margin));
        assert!(is_expired(url, at(940), margin));
        assert!(is_expired(url, at(2000), margin));
    }

    #[test]
    fn out_of_range_durations_mean_no_expiry() {
        for secs in ["100000000000000", "9223372036854775807", "-9223372036854775808"] {
            let amz = format!(
                "https://b.s3.amazonaws.com/a.png?X-Amz-Date=20240101T000000Z&X-Amz-Expires={secs}&X-Amz-Signature=s"
            );
            assert_eq!(parse_expiry(&amz), None, "{amz}");
            let oss = format!("images/a.png?x-oss-date=20240101T000000Z&x-oss-expires={secs}");
            assert_eq!(parse_expiry(&oss), None, "{oss}");
        }
    }

    #[test]
    fn out_of_range_unix_expires_means_no_expiry() {
        assert_eq!(parse_expiry("a.png?Expires=9223372036854775807"), None);
        assert_eq!(parse_expiry("a.png?Expires=-9223372036854775808"), None);
        assert!(!is_expired("a.png?Expires=9223372036854775807", at(0), Duration::seconds(60)));
    }

    #[test]
    fn margin_past_the_calendar_counts_as_past() {
        // A million years ahead of now is beyond chrono's date range
        let margin = Duration::days(365 * 1_000_000);
        assert!(is_past(at(2_000_000_000), at(1_000), margin));
    }

    #[test]
    fn no_expiry_never_expires() {
        assert!(!is_expired("https://example.com/a.png", at(i32::MAX as i64), Duration::seconds(60)));
    }
}
