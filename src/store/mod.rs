//! Key-value store subsystem.
//!
//! # Data Flow
//! ```text
//! rate limiter ──┐
//! settings ──────┼──▶ KvStore (get / put with TTL / delete)
//! admin API ─────┘        ├── memory.rs (DashMap, single process)
//!                         └── redis.rs  (shared between instances)
//! ```
//!
//! # Design Decisions
//! - Values are plain strings; callers own serialization
//! - No atomic increment in the contract, so callers must tolerate races
//! - Expiration is a store concern; callers only pass a TTL

pub mod memory;
pub mod redis;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{StoreBackend, StoreConfig};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or rejected the command.
    #[error("store backend error: {0}")]
    Backend(String),

    /// The store was misconfigured.
    #[error("store configuration error: {0}")]
    Config(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// String key-value store with per-key expiration.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value. Expired keys read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, optionally expiring after `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Short backend name for status output.
    fn backend_name(&self) -> &'static str;
}

/// Store handle shared by every component.
pub type SharedStore = Arc<dyn KvStore>;

/// How often the memory backend drops expired entries.
const MEMORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Open the configured backend and apply seed values for absent keys.
///
/// The memory backend sweeps expired entries until `shutdown` fires.
pub async fn open_store(
    config: &StoreConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<SharedStore, StoreError> {
    let store: SharedStore = match config.backend {
        StoreBackend::Memory => {
            let memory = MemoryStore::new();
            memory.spawn_sweeper(MEMORY_SWEEP_INTERVAL, shutdown);
            Arc::new(memory)
        }
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| StoreError::Config("redis_url is not set".into()))?;
            Arc::new(RedisStore::connect(url).await?)
        }
    };

    let seeded = seed_store(store.as_ref(), &config.seed).await?;

    tracing::info!(
        backend = store.backend_name(),
        seeded,
        "Key-value store ready"
    );
    Ok(store)
}

/// Write each seed value whose key is absent. Returns how many were written.
pub async fn seed_store(
    store: &dyn KvStore,
    seed: &BTreeMap<String, String>,
) -> Result<usize, StoreError> {
    let mut written = 0;
    for (key, value) in seed {
        if store.get(key).await?.is_none() {
            store.put(key, value, None).await?;
            tracing::debug!(key = %key, "Seeded store key");
            written += 1;
        }
    }
    Ok(written)
}
