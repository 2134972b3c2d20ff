//! Deciding whether an object reference must go through the signing endpoint.
//!
//! Rules, first match wins:
//!
//! | Reference | Needs signing |
//! |---|---|
//! | empty / absent | no |
//! | `data:` or `blob:` | no |
//! | starts with `/`, `./`, `../` | no (same origin) |
//! | carries a signature parameter | only if that signature is expired |
//! | http(s) on an object-storage host | yes |
//! | http(s) with a media category path segment | yes |
//! | any other http(s) URL | no (third party) |
//! | anything else (bare key) | yes |
//!
//! When in doubt the answer is "yes": an unnecessary signing call is cheap,
//! a skipped one is a broken image.

use super::clock::{Clock, SystemClock};
use super::expiry::{self, query_pairs};
use crate::config::SigningConfig;
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;

/// Reference classifier built from [`SigningConfig`] patterns.
#[derive(Debug, Clone)]
pub struct ReferenceClassifier {
    storage_hosts: Vec<String>,
    category_segments: Vec<String>,
    signature_params: Vec<String>,
    expiry_margin: Duration,
}

impl ReferenceClassifier {
    pub fn from_config(config: &SigningConfig) -> Self {
        Self {
            storage_hosts: config
                .storage_hosts
                .iter()
                .map(|h| h.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            category_segments: config.category_segments.clone(),
            signature_params: config.signature_params.clone(),
            expiry_margin: config.expiry_margin(),
        }
    }

    pub fn expiry_margin(&self) -> Duration {
        self.expiry_margin
    }

    /// Classify against the system clock.
    pub fn needs_signed_url(&self, reference: Option<&str>) -> bool {
        self.needs_signed_url_at(reference, SystemClock.now())
    }

    /// Classify as of `now`. Pure: same inputs, same answer.
    pub fn needs_signed_url_at(&self, reference: Option<&str>, now: DateTime<Utc>) -> bool {
        let reference = match reference.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return false,
        };

        if has_scheme(reference, "data") || has_scheme(reference, "blob") {
            return false;
        }
        if reference.starts_with('/') || reference.starts_with("./") || reference.starts_with("../")
        {
            return false;
        }

        let pairs = query_pairs(reference);
        let signed = pairs.iter().any(|(k, _)| {
            self.signature_params
                .iter()
                .any(|p| p.eq_ignore_ascii_case(k))
        });
        if signed {
            return expiry::expiry_from_pairs(&pairs)
                .is_some_and(|at| expiry::is_past(at, now, self.expiry_margin));
        }

        match http_url(reference) {
            Some(url) => self.is_storage_host(&url) || self.has_category_segment(&url),
            None => true,
        }
    }

    fn is_storage_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.storage_hosts
            .iter()
            .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
    }

    fn has_category_segment(&self, url: &Url) -> bool {
        url.path_segments().is_some_and(|mut segments| {
            segments.any(|s| self.category_segments.iter().any(|c| c == s))
        })
    }
}

impl Default for ReferenceClassifier {
    fn default() -> Self {
        Self::from_config(&SigningConfig::default())
    }
}

/// Classify with the default patterns and the system clock.
pub fn needs_signed_url(reference: Option<&str>) -> bool {
    ReferenceClassifier::default().needs_signed_url(reference)
}

/// Whether a reference is an absolute http(s) URL.
pub fn is_http_url(reference: &str) -> bool {
    http_url(reference).is_some()
}

fn http_url(reference: &str) -> Option<Url> {
    let url = Url::parse(reference).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn has_scheme(reference: &str, scheme: &str) -> bool {
    reference
        .get(..scheme.len() + 1)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&format!("{scheme}:")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn classify(reference: &str) -> bool {
        ReferenceClassifier::default().needs_signed_url_at(Some(reference), now())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    // =========================================================================
    // No signing
    // =========================================================================

    #[test]
    fn empty_and_absent_need_nothing() {
        let c = ReferenceClassifier::default();
        assert!(!c.needs_signed_url_at(None, now()));
        assert!(!c.needs_signed_url_at(Some(""), now()));
        assert!(!c.needs_signed_url_at(Some("   "), now()));
    }

    #[test]
    fn inline_data_never_signed() {
        assert!(!classify("data:image/png;base64,AAAA"));
        assert!(!classify("blob:https://app.example.com/0b1e-44"));
        assert!(!classify("DATA:image/png;base64,AAAA"));
    }

    #[test]
    fn relative_paths_served_directly() {
        assert!(!classify("/local/logo.png"));
        assert!(!classify("./logo.png"));
        assert!(!classify("../assets/logo.png"));
    }

    #[test]
    fn third_party_urls_pass_through() {
        assert!(!classify("https://upload.wikimedia.org/commons/a.jpg"));
        assert!(!classify("http://example.com/static/banner.webp"));
    }

    // =========================================================================
    // Signing required
    // =========================================================================

    #[test]
    fn object_storage_hosts_need_signing() {
        assert!(classify(
            "https://cdn.example-oss.aliyuncs.com/oss-bucket/images/abc.png"
        ));
        assert!(classify("https://bucket.s3.us-east-1.amazonaws.com/x.mp4"));
        assert!(classify("https://storage.googleapis.com/bucket/x.png"));
        assert!(!classify("https://notaliyuncs.com/x.png"));
    }

    #[test]
    fn category_paths_need_signing() {
        assert!(classify("https://media.example.com/images/2024/a.png"));
        assert!(classify("https://media.example.com/u/avatars/42.jpg"));
        assert!(classify("https://media.example.com/videos/clip.mp4"));
        assert!(!classify("https://media.example.com/imagesets/a.png"));
    }

    #[test]
    fn bare_keys_need_signing() {
        assert!(classify("images/foo.png"));
        assert!(classify("uploads/2024/06/01/abc123"));
        assert!(classify("abc123"));
    }

    // =========================================================================
    // Already signed
    // =========================================================================

    #[test]
    fn valid_signature_is_left_alone() {
        let expires = now().timestamp() + 3600;
        let url = format!(
            "https://bucket.oss-cn-hangzhou.aliyuncs.com/images/a.png?OSSAccessKeyId=k&Expires={expires}&Signature=s"
        );
        assert!(!classify(&url));
    }

    #[test]
    fn expired_signature_is_resigned() {
        let expires = now().timestamp() - 10;
        let url = format!("https://bucket.aliyuncs.com/a.png?Expires={expires}&Signature=s");
        assert!(classify(&url));
    }

    #[test]
    fn signature_inside_margin_counts_as_expired() {
        let expires = now().timestamp() + 30;
        let url = format!("https://bucket.aliyuncs.com/a.png?Expires={expires}&Signature=s");
        assert!(classify(&url));
    }

    #[test]
    fn signature_without_expiry_is_trusted() {
        assert!(!classify(
            "https://b.s3.amazonaws.com/a.png?X-Amz-Signature=abc"
        ));
    }

    #[test]
    fn amz_signature_with_stamp() {
        let fresh = "https://b.s3.amazonaws.com/a.png?X-Amz-Date=20240601T113000Z&X-Amz-Expires=3600&X-Amz-Signature=s";
        let stale = "https://b.s3.amazonaws.com/a.png?X-Amz-Date=20240601T100000Z&X-Amz-Expires=3600&X-Amz-Signature=s";
        assert!(!classify(fresh));
        assert!(classify(stale));
    }

    #[test]
    fn huge_signature_durations_classify_without_panicking() {
        let huge = "X-Amz-Date=20240101T000000Z&X-Amz-Expires=100000000000000&X-Amz-Signature=s";
        let max = "X-Amz-Date=20240101T000000Z&X-Amz-Expires=9223372036854775807&X-Amz-Signature=s";
        // Signed, but the expiry cannot be read: trusted like any other
        assert!(!classify(&format!("https://b.s3.amazonaws.com/a.png?{huge}")));
        assert!(!classify(&format!("images/a.png?{max}")));
        assert!(!classify("images/a.png?Expires=9223372036854775807&Signature=s"));
        // No signature parameter: still a bare key
        assert!(classify("images/a.png?X-Amz-Date=20240101T000000Z&X-Amz-Expires=9223372036854775807"));
    }

    #[test]
    fn huge_margin_treats_every_expiry_as_past() {
        let config = SigningConfig {
            expiry_margin_secs: u64::MAX,
            ..SigningConfig::default()
        };
        let c = ReferenceClassifier::from_config(&config);
        let expires = now().timestamp() + 3600;
        let url = format!("https://bucket.aliyuncs.com/a.png?Expires={expires}&Signature=s");
        assert!(c.needs_signed_url_at(Some(&url), now()));
    }

    // =========================================================================
    // Purity and configuration
    // =========================================================================

    #[test]
    fn classification_is_idempotent() {
        let c = ReferenceClassifier::default();
        for r in [
            "images/foo.png",
            "/local/logo.png",
            "https://example.com/a.png",
            "https://x.aliyuncs.com/a.png",
            "data:image/png;base64,AAAA",
        ] {
            let first = c.needs_signed_url_at(Some(r), now());
            let second = c.needs_signed_url_at(Some(r), now());
            assert_eq!(first, second, "{r}");
        }
    }

    #[test]
    fn custom_hosts_from_config() {
        let config = SigningConfig {
            storage_hosts: vec![".media.internal".to_string()],
            category_segments: vec![],
            ..SigningConfig::default()
        };
        let c = ReferenceClassifier::from_config(&config);
        assert!(c.needs_signed_url_at(Some("https://eu.media.internal/a.png"), now()));
        assert!(!c.needs_signed_url_at(Some("https://x.aliyuncs.com/images/a.png"), now()));
    }

    #[test]
    fn free_function_uses_defaults() {
        assert!(needs_signed_url(Some("images/foo.png")));
        assert!(!needs_signed_url(Some("/local/logo.png")));
        assert!(!needs_signed_url(None));
    }

    #[test]
    fn http_url_detection() {
        assert!(is_http_url("https://example.com/a.png"));
        assert!(is_http_url("HTTP://example.com/a.png"));
        assert!(!is_http_url("images/a.png"));
        assert!(!is_http_url("ftp://example.com/a.png"));
    }
}
