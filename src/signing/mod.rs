//! Signed-URL resolution for private object storage.
//!
//! Media stored in a private bucket cannot be fetched by reference alone. A
//! backend endpoint turns a reference (object key or unsigned URL) into a
//! time-limited signed URL. This module decides which references need that,
//! calls the endpoint at most once per reference at a time, caches results for
//! a fixed window, and exposes a watch-style subscription for consumers.
//!
//! ```text
//! reference ──► classify ──(no)──► use as is
//!                  │
//!                (yes)
//!                  ▼
//!            SignedUrlCache ──► cached? ──► in flight? ──► gate ──► Signer
//! ```
//!
//! | Submodule | Role |
//! |---|---|
//! | [`classify`] | `needs_signed_url` rules |
//! | [`expiry`] | reading expiry out of provider-signed URLs |
//! | [`signer`] | the backend seam and its HTTP implementation |
//! | [`cache`] | single-flight cache and concurrency gate |
//! | [`subscribe`] | per-consumer `{resolved_url, is_loading}` state |
//! | [`clock`] | time seam for expiry decisions |

pub mod cache;
pub mod classify;
pub mod clock;
pub mod expiry;
pub mod signer;
pub mod subscribe;

use std::sync::Arc;
use thiserror::Error;

pub use cache::{CacheStats, PrefetchSummary, SignedUrlCache};
pub use classify::{is_http_url, needs_signed_url, ReferenceClassifier};
pub use clock::{Clock, SystemClock};
pub use signer::{HttpSigner, Signer, UnconfiguredSigner};
pub use subscribe::{SignedUrlState, SignedUrlSubscription};

/// Why a reference could not be signed.
///
/// `Clone` because one failure is handed to every caller that was waiting on
/// the same request.
#[derive(Error, Debug, Clone)]
pub enum SignError {
    #[error("signing request failed: {0}")]
    Request(Arc<reqwest::Error>),
    #[error("signing endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("signing endpoint returned no url")]
    MissingUrl,
    #[error("no signing endpoint configured")]
    NoEndpoint,
    #[error("signing aborted: {0}")]
    Aborted(String),
}
