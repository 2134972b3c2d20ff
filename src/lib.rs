//! # Feedwall
//!
//! Layout and media-resolution core for an infinite-scroll media feed.
//!
//! Two independent subsystems:
//!
//! - **Waterfall layout.** Items of varying aspect ratio are distributed over
//!   N columns so heights stay balanced, and items that were already placed
//!   stay in their column when more items arrive or a ratio is corrected.
//! - **Signed-URL resolution.** Media in a private bucket is fetched through
//!   time-limited signed URLs. References are classified, signing calls are
//!   shared per reference, bounded process-wide, and cached for a fixed window.
//!
//! Around them sits a small pipeline used by the CLI:
//!
//! ```text
//! 1. Scan      media/     →  feed.json        (dimensions, stable ids)
//! 2. Layout    feed.json  →  columns          (sticky waterfall)
//! 3. Resolve   sources    →  signed URLs      (single-flight cache)
//! 4. Preview   columns    →  dist/index.html  (maud)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`waterfall`] | Column assignment with sticky placements and rebalancing |
//! | [`feed`] | Items + viewport + layout engine; aspect-ratio correction |
//! | [`signing`] | Classification, expiry parsing, signer seam, cache, subscriptions |
//! | [`scan`] | Walks a media directory into a [`types::FeedManifest`] |
//! | [`probe`] | Header-only dimension reading (`image`, `avif-parse`) |
//! | [`generate`] | Static HTML preview rendered with Maud |
//! | [`config`] | `feedwall.toml` loading, merging, and validation |
//! | [`types`] | `FeedItem` and the manifest shared between stages |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Heights From Zero
//!
//! Every layout pass sums column heights from scratch instead of keeping
//! running totals. Passes are cheap (one walk over the items) and a corrected
//! aspect ratio is reflected without any bookkeeping.
//!
//! ## Sticky Within a Threshold
//!
//! An item keeps its column unless that column is more than
//! `rebalance_threshold` height units taller than the shortest one. Small
//! imbalances are tolerated so that "load more" never visibly reshuffles
//! what the user has already seen.
//!
//! ## One Cache Per Process
//!
//! [`signing::SignedUrlCache`] is an explicit handle rather than a global.
//! Clones share state, so an application creates one and passes it around,
//! and every test gets a fresh one.

pub mod config;
pub mod feed;
pub mod generate;
pub mod output;
pub mod probe;
pub mod scan;
pub mod signing;
pub mod types;
pub mod waterfall;
