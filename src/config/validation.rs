//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows and timeouts between 1 and their caps)
//! - Check that URLs in the allow-list and challenge endpoint parse
//! - Refuse to expose the admin API with the placeholder key
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{EdgeConfig, StoreBackend, ADMIN_KEY_PLACEHOLDER};

/// Longest accepted rate-limit window or record TTL: one day.
pub const MAX_WINDOW_SECS: u64 = 86_400;
/// Longest accepted upstream or attestation timeout: one hour.
pub const MAX_TIMEOUT_SECS: u64 = 3_600;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.store.backend == StoreBackend::Redis
        && config.store.redis_url.as_deref().map_or(true, str::is_empty)
    {
        errors.push(ValidationError::new(
            "store.redis_url",
            "required when store.backend = \"redis\"",
        ));
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be at least 1"));
    }
    check_range(&mut errors, "rate_limit.window_secs", config.rate_limit.window_secs, MAX_WINDOW_SECS);
    if config.rate_limit.store_ttl_secs > MAX_WINDOW_SECS {
        errors.push(ValidationError::new(
            "rate_limit.store_ttl_secs",
            format!("must be at most {MAX_WINDOW_SECS}"),
        ));
    }
    if config.rate_limit.client_ip_header.trim().is_empty() {
        errors.push(ValidationError::new("rate_limit.client_ip_header", "must not be empty"));
    }

    for origin in &config.origin.allowed_origins {
        if !is_http_url(origin) {
            errors.push(ValidationError::new(
                "origin.allowed_origins",
                format!("'{origin}' is not an absolute http(s) URL"),
            ));
        }
    }
    if let Some(prefix) = &config.origin.trusted_referer_prefix {
        if !is_http_url(prefix) {
            errors.push(ValidationError::new(
                "origin.trusted_referer_prefix",
                format!("'{prefix}' is not an absolute http(s) URL"),
            ));
        }
    }

    if !is_http_url(&config.challenge.verify_url) {
        errors.push(ValidationError::new(
            "challenge.verify_url",
            format!("'{}' is not an absolute http(s) URL", config.challenge.verify_url),
        ));
    }
    check_range(&mut errors, "challenge.timeout_secs", config.challenge.timeout_secs, MAX_TIMEOUT_SECS);

    if config.payload.required_field.is_empty() {
        errors.push(ValidationError::new("payload.required_field", "must not be empty"));
    }
    if config.payload.max_body_bytes == 0 {
        errors.push(ValidationError::new("payload.max_body_bytes", "must be at least 1"));
    }

    check_range(&mut errors, "upstream.timeout_secs", config.upstream.timeout_secs, MAX_TIMEOUT_SECS);
    check_range(
        &mut errors,
        "upstream.connect_timeout_secs",
        config.upstream.connect_timeout_secs,
        MAX_TIMEOUT_SECS,
    );

    if config.admin.enabled {
        if config.admin.api_key.is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set to a real key when the admin API is enabled",
            ));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("'{}' is not a socket address", config.admin.bind_address),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(errors: &mut Vec<ValidationError>, field: &'static str, value: u64, max: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be at least 1"));
    } else if value > max {
        errors.push(ValidationError::new(field, format!("must be at most {max}")));
    }
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}
