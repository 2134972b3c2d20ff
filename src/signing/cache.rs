//! Signed-URL cache with single-flight resolution and a concurrency gate.
//!
//! # Design
//!
//! [`SignedUrlCache::resolve`] goes through four steps:
//!
//! 1. References that need no signing (see [`classify`](super::classify))
//!    come back unchanged.
//! 2. A cache entry younger than the validity window is served directly.
//! 3. A signing request already in flight for the exact same string is
//!    shared: every caller awaits the same future and gets the same URL or
//!    the same error.
//! 4. Otherwise a new signing request is spawned. It waits for a permit from
//!    the gate, calls the [`Signer`], then caches the URL on success and
//!    clears its in-flight slot either way.
//!
//! The gate is a fair semaphore. The request joins its wait queue before the
//! task is spawned, under the state lock, so permits go out in the order
//! requests were issued no matter which worker thread polls the task first.
//!
//! Signing runs on its own task. A caller that stops awaiting does not cancel
//! it, and a late success still lands in the cache.
//!
//! ## Expiry
//!
//! Entries expire `validity_secs` after they were written and are dropped
//! lazily at lookup. The window must be shorter than the signature lifetime
//! the backend hands out, so a served URL always has some life left.
//!
//! ## Failures
//!
//! No retries and no backoff. A failure is reported once to the callers that
//! were waiting, nothing is cached, and the next request starts fresh.

use super::classify::ReferenceClassifier;
use super::clock::{Clock, SystemClock};
use super::expiry;
use super::signer::{HttpSigner, Signer, UnconfiguredSigner};
use super::SignError;
use crate::config::SigningConfig;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

type PendingSign = Shared<BoxFuture<'static, Result<String, SignError>>>;

/// A signed URL and the moment it stops being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    pub expiry: DateTime<Utc>,
}

/// Counters for one cache instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Served from a cache entry.
    pub hits: u64,
    /// Joined a request already in flight.
    pub shared: u64,
    /// Started a new signing request.
    pub signed: u64,
    /// Signing requests that failed.
    pub failures: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.shared + self.signed
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 || self.shared > 0 {
            write!(
                f,
                "{} cached, {} shared, {} signed ({} total)",
                self.hits,
                self.shared,
                self.signed,
                self.total()
            )?;
        } else {
            write!(f, "{} signed", self.signed)?;
        }
        if self.failures > 0 {
            write!(f, ", {} failed", self.failures)?;
        }
        Ok(())
    }
}

/// Outcome of a batch prefetch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchSummary {
    /// References that went through resolution.
    pub scheduled: usize,
    /// Of those, how many failed.
    pub failed: usize,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, CacheEntry>,
    in_flight: HashMap<String, PendingSign>,
    stats: CacheStats,
}

struct Inner {
    signer: Arc<dyn Signer>,
    classifier: ReferenceClassifier,
    clock: Arc<dyn Clock>,
    validity: Duration,
    gate: Arc<Semaphore>,
    max_concurrent: usize,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, reference: &str, result: &Result<String, SignError>) {
        let mut state = self.state();
        state.in_flight.remove(reference);
        match result {
            Ok(url) => {
                let expiry = self
                    .clock
                    .now()
                    .checked_add_signed(self.validity)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                debug!(reference, %expiry, "cached signed url");
                state.entries.insert(
                    reference.to_string(),
                    CacheEntry {
                        url: url.clone(),
                        expiry,
                    },
                );
            }
            Err(e) => {
                state.stats.failures += 1;
                warn!(reference, error = %e, "signing failed");
            }
        }
    }
}

/// Process-wide signed-URL resolver.
///
/// Cloning is cheap and every clone shares the same cache, in-flight table
/// and gate. Construct one per process (or per test).
#[derive(Clone)]
pub struct SignedUrlCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for SignedUrlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("SignedUrlCache")
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .field("max_concurrent", &self.inner.max_concurrent)
            .finish()
    }
}

impl SignedUrlCache {
    pub fn new(signer: Arc<dyn Signer>, config: &SigningConfig) -> Self {
        Self::with_clock(signer, config, Arc::new(SystemClock))
    }

    pub fn with_clock(signer: Arc<dyn Signer>, config: &SigningConfig, clock: Arc<dyn Clock>) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            inner: Arc::new(Inner {
                signer,
                classifier: ReferenceClassifier::from_config(config),
                clock,
                validity: config.validity(),
                gate: Arc::new(Semaphore::new(max_concurrent)),
                max_concurrent,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Build with an [`HttpSigner`] for the configured endpoint, or a signer
    /// that always fails when there is none.
    pub fn from_config(config: &SigningConfig) -> Self {
        let signer: Arc<dyn Signer> = match HttpSigner::from_config(config) {
            Some(http) => Arc::new(http),
            None => Arc::new(UnconfiguredSigner),
        };
        Self::new(signer, config)
    }

    pub fn classifier(&self) -> &ReferenceClassifier {
        &self.inner.classifier
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Classify a reference against this cache's patterns and clock.
    pub fn needs_signed_url(&self, reference: Option<&str>) -> bool {
        self.inner
            .classifier
            .needs_signed_url_at(reference, self.inner.clock.now())
    }

    /// Cached URL for a reference, if present and not expired.
    pub fn cached(&self, reference: &str) -> Option<String> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state();
        self.lookup(&mut state, reference, now)
    }

    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state().in_flight.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.state().stats
    }

    /// Drop every cached entry. Requests in flight are unaffected.
    pub fn clear(&self) {
        self.inner.state().entries.clear();
    }

    /// Permits currently free at the gate.
    pub fn available_permits(&self) -> usize {
        self.inner.gate.available_permits()
    }

    fn lookup(&self, state: &mut State, reference: &str, now: DateTime<Utc>) -> Option<String> {
        let entry = state.entries.get(reference)?;
        let fresh = now < entry.expiry
            && !expiry::is_expired(&entry.url, now, self.inner.classifier.expiry_margin());
        if fresh {
            Some(entry.url.clone())
        } else {
            state.entries.remove(reference);
            None
        }
    }

    /// Resolve a reference to something directly fetchable.
    pub async fn resolve(&self, reference: &str) -> Result<String, SignError> {
        let now = self.inner.clock.now();
        if !self
            .inner
            .classifier
            .needs_signed_url_at(Some(reference), now)
        {
            return Ok(reference.to_string());
        }

        let pending = {
            let mut state = self.inner.state();
            if let Some(url) = self.lookup(&mut state, reference, now) {
                state.stats.hits += 1;
                return Ok(url);
            }
            match state.in_flight.get(reference) {
                Some(pending) => {
                    debug!(reference, "joining signing request in flight");
                    let pending = pending.clone();
                    state.stats.shared += 1;
                    pending
                }
                None => {
                    let pending = self.start(reference);
                    state.in_flight.insert(reference.to_string(), pending.clone());
                    state.stats.signed += 1;
                    pending
                }
            }
        };

        pending.await
    }

    /// Spawn the signing task for `reference`. Caller registers the result as
    /// in flight while still holding the state lock.
    fn start(&self, reference: &str) -> PendingSign {
        let ticket = queue_at_gate(&self.inner.gate);
        let inner = Arc::clone(&self.inner);
        let key = reference.to_string();
        let task = tokio::spawn(async move {
            let result = match ticket.await {
                Ok(_permit) => inner.signer.sign(&key).await,
                Err(_) => Err(SignError::Aborted("signing gate closed".to_string())),
            };
            inner.settle(&key, &result);
            result
        });

        let inner = Arc::clone(&self.inner);
        let key = reference.to_string();
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_err) => {
                    let result = Err(SignError::Aborted(join_err.to_string()));
                    inner.settle(&key, &result);
                    result
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Warm the cache for a batch of references.
    ///
    /// Absent references, ones that need no signing and ones already cached
    /// are skipped; duplicates are resolved once.
    pub async fn prefetch<I, S>(&self, references: I) -> PrefetchSummary
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for reference in references.into_iter().flatten() {
            let reference = reference.as_ref();
            if !self.needs_signed_url(Some(reference)) || self.cached(reference).is_some() {
                continue;
            }
            if seen.insert(reference.to_string()) {
                pending.push(reference.to_string());
            }
        }

        let results =
            futures::future::join_all(pending.iter().map(|r| self.resolve(r))).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(scheduled = pending.len(), failed, "prefetch finished");

        PrefetchSummary {
            scheduled: pending.len(),
            failed,
        }
    }
}

/// Join the gate's wait queue now and hand back the pending acquisition.
///
/// Polling once registers the waiter with the semaphore; later polls from
/// the signing task keep that queue position. `unconstrained` keeps tokio's
/// cooperative budget from skipping the registration in large batches.
fn queue_at_gate(
    gate: &Arc<Semaphore>,
) -> impl Future<Output = Result<OwnedSemaphorePermit, AcquireError>> + Send + 'static {
    let mut acquire = Box::pin(tokio::task::unconstrained(Arc::clone(gate).acquire_owned()));
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    match acquire.as_mut().poll(&mut cx) {
        Poll::Ready(result) => futures::future::ready(result).left_future(),
        Poll::Pending => acquire.right_future(),
    }
}
