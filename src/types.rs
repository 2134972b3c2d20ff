//! Shared types used across the scan, layout, and preview stages.
//!
//! [`FeedManifest`] is serialized to JSON by `scan` and read back by every
//! command that lays out or renders a feed.

use serde::{Deserialize, Serialize};

/// A single entry in a media feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable unique identifier.
    pub id: String,
    /// Object reference for the media (storage key, relative path or URL).
    pub source: String,
    /// Width / height. Assumed square until real dimensions are known.
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

fn default_aspect_ratio() -> f64 {
    1.0
}

impl FeedItem {
    /// A new item with the default square aspect ratio.
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            aspect_ratio: default_aspect_ratio(),
            width: None,
            height: None,
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: f64) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// Aspect ratio usable for height accounting: missing, zero, negative or
    /// non-finite values count as square.
    pub fn effective_aspect_ratio(&self) -> f64 {
        sanitize_ratio(self.aspect_ratio)
    }

    /// Apply real media dimensions.
    ///
    /// The stored ratio only changes when the new one differs by more than
    /// `tolerance`; returns whether it changed (and a re-layout is due).
    /// Degenerate dimensions are ignored.
    pub fn correct_aspect_ratio(&mut self, width: u32, height: u32, tolerance: f64) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        let measured = width as f64 / height as f64;
        if (measured - self.aspect_ratio).abs() <= tolerance {
            return false;
        }
        self.aspect_ratio = measured;
        self.width = Some(width);
        self.height = Some(height);
        true
    }
}

/// Clamp a ratio to something safe to divide by.
pub fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

/// Manifest produced by the scan stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedManifest {
    /// Directory the items were scanned from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub items: Vec<FeedItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_is_square() {
        let item = FeedItem::new("a", "images/a.png");
        assert_eq!(item.aspect_ratio, 1.0);
        assert_eq!(item.effective_aspect_ratio(), 1.0);
    }

    #[test]
    fn degenerate_ratios_count_as_square() {
        for ratio in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let item = FeedItem::new("a", "a").with_aspect_ratio(ratio);
            assert_eq!(item.effective_aspect_ratio(), 1.0, "ratio {ratio}");
        }
    }

    #[test]
    fn correction_within_tolerance_is_ignored() {
        let mut item = FeedItem::new("a", "a");
        // 1.04 is within 0.05 of 1.0
        assert!(!item.correct_aspect_ratio(104, 100, 0.05));
        assert_eq!(item.aspect_ratio, 1.0);
        assert_eq!(item.width, None);
    }

    #[test]
    fn correction_beyond_tolerance_updates() {
        let mut item = FeedItem::new("a", "a");
        assert!(item.correct_aspect_ratio(1600, 900, 0.05));
        assert!((item.aspect_ratio - 16.0 / 9.0).abs() < 1e-9);
        assert_eq!(item.width, Some(1600));
        assert_eq!(item.height, Some(900));

        // Same dimensions again: no further change
        assert!(!item.correct_aspect_ratio(1600, 900, 0.05));
    }

    #[test]
    fn correction_ignores_zero_dimensions() {
        let mut item = FeedItem::new("a", "a");
        assert!(!item.correct_aspect_ratio(0, 100, 0.05));
        assert!(!item.correct_aspect_ratio(100, 0, 0.05));
        assert_eq!(item.aspect_ratio, 1.0);
    }

    #[test]
    fn manifest_json_defaults_missing_ratio() {
        let json = r#"{"items":[{"id":"x","source":"images/x.png"}]}"#;
        let manifest: FeedManifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.items[0].aspect_ratio, 1.0);
        assert!(manifest.root.is_none());
    }
}
