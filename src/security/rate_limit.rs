//! Fixed-window rate limiting over the key-value store.
//!
//! Each client owns one record at `ratelimit:<client>`:
//!
//! ```text
//! no record / corrupt / now > reset_at  → write {1, now + window}, admit
//! count >= max                          → refuse, no write
//! otherwise                             → write {count + 1, reset_at}, admit
//! ```
//!
//! The read and the write are separate store calls. Two requests racing on
//! the same client can both read the old count and both be admitted; the
//! limiter is a throttle, not an exact quota.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;
use crate::store::{SharedStore, StoreError};

/// Stored state for one client's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub count: u32,
    /// Window end, milliseconds since the Unix epoch.
    pub reset_at: u64,
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Window end, milliseconds since the Unix epoch.
    pub reset_at: u64,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_at.saturating_sub(now_ms).div_ceil(1000)
    }
}

/// Store key for a client's bucket.
pub fn rate_limit_key(client_id: &str) -> String {
    format!("ratelimit:{client_id}")
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fixed-window limiter keyed by client identifier.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: SharedStore,
    max_requests: u32,
    window: Duration,
    store_ttl: Duration,
}

impl FixedWindowLimiter {
    pub fn new(store: SharedStore, config: &RateLimitConfig) -> Self {
        Self {
            store,
            max_requests: config.max_requests,
            window: config.window(),
            store_ttl: config.store_ttl(),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count one request for `client_id` against the current window.
    pub async fn check_and_consume(&self, client_id: &str) -> Result<RateLimitDecision, StoreError> {
        self.check_and_consume_at(client_id, now_millis()).await
    }

    /// Same as [`check_and_consume`](Self::check_and_consume) with an explicit clock.
    pub async fn check_and_consume_at(
        &self,
        client_id: &str,
        now_ms: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = rate_limit_key(client_id);

        let record = match self.read_record(&key).await? {
            Some(record) if now_ms <= record.reset_at => record,
            _ => {
                let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);
                let fresh = RateLimitRecord {
                    count: 1,
                    reset_at: now_ms.saturating_add(window_ms),
                };
                self.write_record(&key, &fresh).await?;
                return Ok(RateLimitDecision {
                    allowed: true,
                    limit: self.max_requests,
                    remaining: self.max_requests.saturating_sub(1),
                    reset_at: fresh.reset_at,
                });
            }
        };

        if record.count >= self.max_requests {
            tracing::debug!(client = %client_id, count = record.count, "Rate limit reached");
            return Ok(RateLimitDecision {
                allowed: false,
                limit: self.max_requests,
                remaining: 0,
                reset_at: record.reset_at,
            });
        }

        let updated = RateLimitRecord {
            count: record.count + 1,
            reset_at: record.reset_at,
        };
        self.write_record(&key, &updated).await?;

        Ok(RateLimitDecision {
            allowed: true,
            limit: self.max_requests,
            remaining: self.max_requests - record.count - 1,
            reset_at: record.reset_at,
        })
    }

    /// Read a client's bucket without consuming anything.
    pub async fn peek(&self, client_id: &str) -> Result<Option<RateLimitRecord>, StoreError> {
        self.read_record(&rate_limit_key(client_id)).await
    }

    /// Drop a client's bucket so its next request opens a new window.
    pub async fn reset(&self, client_id: &str) -> Result<(), StoreError> {
        self.store.delete(&rate_limit_key(client_id)).await
    }

    async fn read_record(&self, key: &str) -> Result<Option<RateLimitRecord>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<RateLimitRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding unreadable rate limit record");
                Ok(None)
            }
        }
    }

    async fn write_record(&self, key: &str, record: &RateLimitRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StoreError::Backend(format!("serialize rate limit record: {e}")))?;
        self.store.put(key, &json, Some(self.store_ttl)).await
    }
}
