//! Per-consumer view of a reference being resolved.
//!
//! A subscription publishes `{resolved_url, is_loading}` on a watch channel.
//! The initial value is computed synchronously, so a reference that needs no
//! signing (or is already cached) never shows a loading state. Otherwise the
//! state flips once, when signing settles.
//!
//! Changing the reference or dropping the subscription stops the pending
//! update from being published. The signing request itself keeps running and
//! still fills the shared cache.

use super::cache::SignedUrlCache;
use super::classify::is_http_url;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a consumer should render right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedUrlState {
    pub resolved_url: Option<String>,
    pub is_loading: bool,
}

impl SignedUrlState {
    fn ready(url: Option<String>) -> Self {
        Self {
            resolved_url: url,
            is_loading: false,
        }
    }

    fn loading() -> Self {
        Self {
            resolved_url: None,
            is_loading: true,
        }
    }
}

impl SignedUrlCache {
    /// State a consumer can show without waiting.
    pub fn initial_state(&self, reference: Option<&str>) -> SignedUrlState {
        let Some(reference) = reference.filter(|r| !r.trim().is_empty()) else {
            return SignedUrlState::ready(None);
        };
        if !self.needs_signed_url(Some(reference)) {
            return SignedUrlState::ready(Some(reference.to_string()));
        }
        match self.cached(reference) {
            Some(url) => SignedUrlState::ready(Some(url)),
            None => SignedUrlState::loading(),
        }
    }

    /// Subscribe to the resolution of `reference`.
    ///
    /// Must be called inside a tokio runtime when the reference needs signing.
    pub fn subscribe(&self, reference: Option<&str>) -> SignedUrlSubscription {
        let (tx, rx) = watch::channel(SignedUrlState::default());
        let mut subscription = SignedUrlSubscription {
            cache: self.clone(),
            reference: None,
            tx: Arc::new(tx),
            rx,
            cancel: CancellationToken::new(),
        };
        subscription.evaluate(reference);
        subscription
    }
}

/// State published after a failed signing attempt.
///
/// A plain http(s) URL is still worth trying as is; a bare key is not.
pub(crate) fn fallback(reference: &str) -> SignedUrlState {
    let url = is_http_url(reference).then(|| reference.to_string());
    SignedUrlState::ready(url)
}

/// Watch handle over one reference's resolution.
pub struct SignedUrlSubscription {
    cache: SignedUrlCache,
    reference: Option<String>,
    tx: Arc<watch::Sender<SignedUrlState>>,
    rx: watch::Receiver<SignedUrlState>,
    cancel: CancellationToken,
}

impl SignedUrlSubscription {
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn current(&self) -> SignedUrlState {
        self.rx.borrow().clone()
    }

    /// A receiver for rendering code that wants its own handle.
    pub fn receiver(&self) -> watch::Receiver<SignedUrlState> {
        self.rx.clone()
    }

    /// Wait for the next published state. Returns `None` if nothing more can
    /// be published.
    pub async fn changed(&mut self) -> Option<SignedUrlState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state is no longer loading.
    pub async fn settled(&mut self) -> SignedUrlState {
        let settled = self
            .rx
            .wait_for(|state| !state.is_loading)
            .await
            .map(|state| state.clone())
            .ok();
        settled.unwrap_or_else(|| self.current())
    }

    /// Point the subscription at another reference. Same reference is a no-op.
    pub fn set_reference(&mut self, reference: Option<&str>) {
        if self.reference.as_deref() == reference {
            return;
        }
        self.evaluate(reference);
    }

    fn evaluate(&mut self, reference: Option<&str>) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.reference = reference.map(str::to_string);

        let initial = self.cache.initial_state(reference);
        let loading = initial.is_loading;
        self.tx.send_replace(initial);
        self.rx.borrow_and_update();

        let Some(reference) = reference.filter(|_| loading) else {
            return;
        };

        let cache = self.cache.clone();
        let tx = Arc::clone(&self.tx);
        let token = self.cancel.clone();
        let reference = reference.to_string();
        tokio::spawn(async move {
            let next = tokio::select! {
                _ = token.cancelled() => return,
                result = cache.resolve(&reference) => match result {
                    Ok(url) => SignedUrlState::ready(Some(url)),
                    Err(e) => {
                        debug!(reference = %reference, error = %e, "falling back after signing failure");
                        fallback(&reference)
                    }
                },
            };
            tx.send_if_modified(|state| {
                if token.is_cancelled() {
                    return false;
                }
                *state = next;
                true
            });
        });
    }
}

impl Drop for SignedUrlSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
