//! Feed configuration module.
//!
//! Handles loading, validating, and merging `feedwall.toml`. Stock defaults
//! are the base layer; a user file only needs the keys it wants to override.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [layout]
//! rebalance_threshold = 1.2   # Extra height a column may carry before items migrate
//! aspect_tolerance = 0.05     # Minimum ratio change that counts as a correction
//!
//! [layout.breakpoints]
//! medium = 768                # Viewport width (px) for the medium layout
//! large = 1280                # Viewport width (px) for the large layout
//! small_columns = 1
//! medium_columns = 2
//! large_columns = 4
//!
//! [signing]
//! # endpoint = "https://api.example.com/storage/sign"
//! query_param = "key"
//! max_concurrent = 10         # Simultaneous signing calls, process-wide
//! validity_secs = 3000        # How long a signed URL is served from cache
//! expiry_margin_secs = 60     # Embedded signatures this close to expiry count as expired
//!
//! [processing]
//! max_processes = 4           # Max parallel probe workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default name of the config file looked up in the working directory.
pub const CONFIG_FILENAME: &str = "feedwall.toml";

/// Upper bound for `validity_secs` and `expiry_margin_secs` (one week, the
/// longest lifetime object stores hand out for a presigned URL).
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Waterfall layout tuning.
    pub layout: LayoutConfig,
    /// Signed-URL resolution settings.
    pub signing: SigningConfig,
    /// Parallel probing settings.
    pub processing: ProcessingConfig,
}

impl FeedConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        if !layout.rebalance_threshold.is_finite() || layout.rebalance_threshold < 0.0 {
            return Err(ConfigError::Validation(
                "layout.rebalance_threshold must be a non-negative number".into(),
            ));
        }
        if !layout.aspect_tolerance.is_finite() || layout.aspect_tolerance < 0.0 {
            return Err(ConfigError::Validation(
                "layout.aspect_tolerance must be a non-negative number".into(),
            ));
        }
        let bp = &layout.breakpoints;
        if bp.medium > bp.large {
            return Err(ConfigError::Validation(
                "layout.breakpoints.medium must not exceed layout.breakpoints.large".into(),
            ));
        }
        if bp.small_columns == 0 || bp.medium_columns == 0 || bp.large_columns == 0 {
            return Err(ConfigError::Validation(
                "layout.breakpoints column counts must be at least 1".into(),
            ));
        }
        if self.signing.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "signing.max_concurrent must be at least 1".into(),
            ));
        }
        if self.signing.validity_secs == 0 {
            return Err(ConfigError::Validation(
                "signing.validity_secs must be non-zero".into(),
            ));
        }
        if self.signing.validity_secs > MAX_WINDOW_SECS {
            return Err(ConfigError::Validation(format!(
                "signing.validity_secs must not exceed {MAX_WINDOW_SECS}"
            )));
        }
        if self.signing.expiry_margin_secs > MAX_WINDOW_SECS {
            return Err(ConfigError::Validation(format!(
                "signing.expiry_margin_secs must not exceed {MAX_WINDOW_SECS}"
            )));
        }
        if self.signing.query_param.is_empty() {
            return Err(ConfigError::Validation(
                "signing.query_param must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Waterfall layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// How much taller (in `1/aspect_ratio` units) an item's column may be than
    /// the shortest column before the item migrates.
    pub rebalance_threshold: f64,
    /// Aspect-ratio corrections smaller than this are ignored.
    pub aspect_tolerance: f64,
    /// Viewport width → column count table.
    pub breakpoints: Breakpoints,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            rebalance_threshold: 1.2,
            aspect_tolerance: 0.05,
            breakpoints: Breakpoints::default(),
        }
    }
}

/// Responsive breakpoints mapping viewport width to a column count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Breakpoints {
    /// Minimum width (px) for the medium layout.
    pub medium: u32,
    /// Minimum width (px) for the large layout.
    pub large: u32,
    pub small_columns: usize,
    pub medium_columns: usize,
    pub large_columns: usize,
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            medium: 768,
            large: 1280,
            small_columns: 1,
            medium_columns: 2,
            large_columns: 4,
        }
    }
}

impl Breakpoints {
    /// Column count for a viewport width.
    pub fn columns_for_width(&self, width: u32) -> usize {
        if width >= self.large {
            self.large_columns
        } else if width >= self.medium {
            self.medium_columns
        } else {
            self.small_columns
        }
    }
}

/// Signed-URL resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SigningConfig {
    /// Signing endpoint. When absent, references that need signing cannot be
    /// resolved and fall back to placeholders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Query parameter carrying the reference.
    pub query_param: String,
    /// Bearer token sent with signing requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Maximum simultaneous signing calls.
    pub max_concurrent: usize,
    /// Seconds a freshly signed URL is served from cache. Keep this shorter
    /// than the real signature lifetime.
    pub validity_secs: u64,
    /// Embedded signatures expiring within this many seconds count as expired.
    pub expiry_margin_secs: u64,
    /// Hostname suffixes of object-storage providers.
    pub storage_hosts: Vec<String>,
    /// Path segments that mark a URL as pointing at stored media.
    pub category_segments: Vec<String>,
    /// Query parameter names that carry a provider signature.
    pub signature_params: Vec<String>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            query_param: "key".to_string(),
            auth_token: None,
            max_concurrent: 10,
            validity_secs: 50 * 60,
            expiry_margin_secs: 60,
            storage_hosts: vec![
                "aliyuncs.com".to_string(),
                "amazonaws.com".to_string(),
                "myqcloud.com".to_string(),
                "r2.cloudflarestorage.com".to_string(),
                "storage.googleapis.com".to_string(),
            ],
            category_segments: vec![
                "images".to_string(),
                "videos".to_string(),
                "avatars".to_string(),
            ],
            signature_params: vec![
                "Signature".to_string(),
                "X-Amz-Signature".to_string(),
                "x-oss-signature".to_string(),
            ],
        }
    }
}

impl SigningConfig {
    /// Cache validity window, clamped to [`MAX_WINDOW_SECS`].
    pub fn validity(&self) -> Duration {
        window(self.validity_secs)
    }

    /// Embedded-expiry margin, clamped to [`MAX_WINDOW_SECS`].
    pub fn expiry_margin(&self) -> Duration {
        window(self.expiry_margin_secs)
    }
}

fn window(secs: u64) -> Duration {
    i64::try_from(secs.min(MAX_WINDOW_SECS))
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(Duration::zero)
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel probe workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(FeedConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<FeedConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: FeedConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, falling back to stock defaults when it
/// does not exist.
pub fn load_config(path: &Path) -> Result<FeedConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `feedwall.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# feedwall configuration
# ======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Waterfall layout
# ---------------------------------------------------------------------------
[layout]
# How much taller (in 1/aspect-ratio units, roughly one square item) an item's
# column may grow past the shortest column before the item migrates.
rebalance_threshold = 1.2

# Aspect-ratio corrections smaller than this are ignored.
aspect_tolerance = 0.05

# Viewport width (px) -> column count.
[layout.breakpoints]
medium = 768
large = 1280
small_columns = 1
medium_columns = 2
large_columns = 4

# ---------------------------------------------------------------------------
# Signed-URL resolution
# ---------------------------------------------------------------------------
[signing]
# Endpoint that turns an object reference into a fetchable URL.
# endpoint = "https://api.example.com/storage/sign"

# Query parameter carrying the reference.
query_param = "key"

# Bearer token sent with every signing request.
# auth_token = "..."

# Simultaneous signing calls, process-wide. Excess requests wait in FIFO order.
max_concurrent = 10

# Seconds a signed URL is served from cache (keep below the real lifetime).
# At most 604800 (one week).
validity_secs = 3000

# Embedded signatures this close to expiry are treated as expired.
# At most 604800.
expiry_margin_secs = 60

# Hostname suffixes of object-storage providers.
storage_hosts = ["aliyuncs.com", "amazonaws.com", "myqcloud.com", "r2.cloudflarestorage.com", "storage.googleapis.com"]

# Path segments that mark stored media.
category_segments = ["images", "videos", "avatars"]

# Query parameters carrying a provider signature.
signature_params = ["Signature", "X-Amz-Signature", "x-oss-signature"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel probe workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
