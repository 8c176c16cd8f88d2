//! Shared handler state.
//!
//! Everything derived from the config lives in one [`EdgeState`] snapshot.
//! A reload builds a new snapshot and swaps it in; in-flight requests keep
//! the snapshot they started with. The store handle is carried across
//! reloads so buckets and settings survive.

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::EdgeConfig;
use crate::security::{ChallengeVerifier, FixedWindowLimiter, OriginGuard};
use crate::store::SharedStore;
use crate::upstream::WebhookClient;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Components built from one config version.
pub struct EdgeState {
    pub config: EdgeConfig,
    pub store: SharedStore,
    pub origin_guard: OriginGuard,
    pub limiter: FixedWindowLimiter,
    pub challenge: ChallengeVerifier,
    pub upstream: WebhookClient,
}

impl EdgeState {
    pub fn build(config: EdgeConfig, store: SharedStore) -> Result<Self, BuildError> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.upstream.connect_timeout());
        if !config.upstream.system_proxy {
            builder = builder.no_proxy();
        }
        let http = builder.build()?;

        Ok(Self {
            origin_guard: OriginGuard::new(&config.origin, &config.cors),
            limiter: FixedWindowLimiter::new(store.clone(), &config.rate_limit),
            challenge: ChallengeVerifier::new(http.clone(), &config.challenge),
            upstream: WebhookClient::new(http, &config.upstream),
            store,
            config,
        })
    }

    /// Rebuild from a new config, keeping the store.
    pub fn rebuild(&self, config: EdgeConfig) -> Result<Self, BuildError> {
        Self::build(config, self.store.clone())
    }
}

/// Handle injected into handlers; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<ArcSwap<EdgeState>>,
}

impl AppState {
    pub fn new(state: EdgeState) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(state)),
        }
    }

    /// Snapshot for the current request.
    pub fn current(&self) -> Arc<EdgeState> {
        self.inner.load_full()
    }

    pub fn replace(&self, state: EdgeState) {
        self.inner.store(Arc::new(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KvStore, MemoryStore};

    #[tokio::test]
    async fn test_reload_keeps_store() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store.put("k", "v", None).await.unwrap();

        let state = AppState::new(EdgeState::build(EdgeConfig::default(), store).unwrap());
        let mut config = EdgeConfig::default();
        config.rate_limit.max_requests = 3;
        let rebuilt = state.current().rebuild(config).unwrap();
        state.replace(rebuilt);

        let current = state.current();
        assert_eq!(current.limiter.max_requests(), 3);
        assert_eq!(current.store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
