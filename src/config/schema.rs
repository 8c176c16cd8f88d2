//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EdgeConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Key-value store backing rate limits and runtime settings.
    pub store: StoreConfig,

    /// Fixed-window rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Origin/Referer allow-list.
    pub origin: OriginConfig,

    /// CORS response headers.
    pub cors: CorsConfig,

    /// Bot-challenge verification.
    pub challenge: ChallengeConfig,

    /// Inbound payload validation.
    pub payload: PayloadConfig,

    /// Upstream webhook call.
    pub upstream: UpstreamConfig,

    /// Which guards the pipeline runs.
    pub pipeline: PipelineConfig,

    /// User-facing messages on error bodies.
    pub messages: MessagesConfig,

    /// Error exposure settings.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map; state is lost on restart and not shared between instances.
    #[default]
    Memory,
    /// Redis reachable at `store.redis_url`.
    Redis,
}

/// Key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Redis connection URL (required for the redis backend).
    pub redis_url: Option<String>,

    /// Values written at startup when the key is absent.
    pub seed: BTreeMap<String, String>,
}

/// What to do with requests whose client cannot be identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnidentifiedPolicy {
    /// Count them all against one `unknown` bucket.
    #[default]
    Shared,
    /// Refuse them with 400.
    Reject,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per client per window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Store-level expiration for bucket records, raised to the window length
    /// when shorter.
    pub store_ttl_secs: u64,

    /// Header carrying the client address.
    pub client_ip_header: String,

    /// Fall back to the TCP peer address when the header is absent.
    pub trust_peer_address: bool,

    pub unidentified: UnidentifiedPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
            store_ttl_secs: 60,
            client_ip_header: "CF-Connecting-IP".to_string(),
            trust_peer_address: false,
            unidentified: UnidentifiedPolicy::Shared,
        }
    }
}

impl RateLimitConfig {
    /// Get the window duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Store TTL, never shorter than the window so live buckets are not evicted.
    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs.max(self.window_secs))
    }
}

/// Origin allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Exact Origin values accepted.
    pub allowed_origins: Vec<String>,

    /// Referer prefix accepted when the Origin is not listed.
    pub trusted_referer_prefix: Option<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "https://translation.demo.nebulainfinity.com".to_string(),
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
            trusted_referer_prefix: Some("https://translation.demo.nebulainfinity.com".to_string()),
        }
    }
}

/// CORS response header configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Send `Access-Control-Allow-Origin: *` when the origin is not listed.
    /// Credentials are never allowed, so the wildcard cannot leak cookies.
    pub wildcard_fallback: bool,

    pub allow_headers: Vec<String>,

    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            wildcard_fallback: true,
            allow_headers: vec![
                "Content-Type".to_string(),
                "CF-Turnstile-Response".to_string(),
            ],
            max_age_secs: 86_400,
        }
    }
}

/// Challenge verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Header carrying the client's challenge token.
    pub token_header: String,

    /// Attestation endpoint.
    pub verify_url: String,

    /// Attestation call timeout in seconds.
    pub timeout_secs: u64,

    /// Reject requests without a token while a secret is configured.
    pub require_token: bool,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            token_header: "CF-Turnstile-Response".to_string(),
            verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string(),
            timeout_secs: 10,
            require_token: false,
        }
    }
}

impl ChallengeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Inbound payload validation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// JSON key that must be present and non-empty.
    pub required_field: String,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            required_field: "問い合わせ内容".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// How upstream JSON is returned to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Forward the upstream JSON untouched.
    #[default]
    Passthrough,
    /// Extract the result text and reply `{"text": ...}`.
    Normalize,
}

/// Upstream webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Total time allowed for the upstream call, body included.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    pub response_mode: ResponseMode,

    /// Honor HTTP(S)_PROXY environment variables for outbound calls.
    pub system_proxy: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            response_mode: ResponseMode::Passthrough,
            system_proxy: true,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Guards composed into the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub origin_guard: bool,
    pub challenge: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            origin_guard: true,
            challenge: true,
        }
    }
}

/// Localized messages returned in the `message` field of error bodies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub unauthorized_origin: String,
    pub challenge_failed: String,
    pub service_busy: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            unauthorized_origin: "不正なアクセス元です。".to_string(),
            challenge_failed: "認証に失敗しました。ページを更新してください。".to_string(),
            service_busy: "サービス混雑中です。時間をあけてからご利用ください。".to_string(),
        }
    }
}

/// Error exposure configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Include raw internal error text in 500 bodies.
    pub expose_internal_errors: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            expose_internal_errors: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key rejected by validation when the admin API is enabled.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: EdgeConfig = toml::from_str(
            r#"
            [rate_limit]
            max_requests = 3

            [upstream]
            response_mode = "normalize"
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.max_requests, 3);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.upstream.response_mode, ResponseMode::Normalize);
        assert_eq!(config.payload.required_field, "問い合わせ内容");
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_store_ttl_never_below_window() {
        let config = RateLimitConfig {
            window_secs: 120,
            store_ttl_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.store_ttl(), Duration::from_secs(120));
    }
}
