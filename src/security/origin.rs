//! Origin/Referer guard and CORS response headers.
//!
//! A request passes when its Origin is in the allow-list, or when its Referer
//! starts with the trusted base URL. The same allow-list decides whether the
//! response echoes the caller's origin or falls back to `*`.

use axum::http::{header, HeaderMap, HeaderValue};

use crate::config::{CorsConfig, OriginConfig};

/// Response headers a browser needs to read the rate-limit headers.
const EXPOSED_HEADERS: &str = "X-RateLimit-Limit, X-RateLimit-Remaining, X-RateLimit-Reset, Retry-After, X-Request-Id";

/// Allow-list check plus CORS header construction.
#[derive(Debug, Clone)]
pub struct OriginGuard {
    allowed_origins: Vec<String>,
    trusted_referer_prefix: Option<String>,
    wildcard_fallback: bool,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl OriginGuard {
    pub fn new(origin: &OriginConfig, cors: &CorsConfig) -> Self {
        let allow_headers = HeaderValue::from_str(&cors.allow_headers.join(", "))
            .unwrap_or_else(|_| HeaderValue::from_static("Content-Type"));

        Self {
            allowed_origins: origin.allowed_origins.clone(),
            trusted_referer_prefix: origin
                .trusted_referer_prefix
                .clone()
                .filter(|p| !p.is_empty()),
            wildcard_fallback: cors.wildcard_fallback,
            allow_headers,
            max_age: HeaderValue::from(cors.max_age_secs),
        }
    }

    /// Exact allow-list membership.
    pub fn is_origin_listed(&self, origin: Option<&str>) -> bool {
        origin.is_some_and(|o| self.allowed_origins.iter().any(|allowed| allowed == o))
    }

    /// Whether the request may proceed.
    pub fn is_allowed(&self, origin: Option<&str>, referer: Option<&str>) -> bool {
        if self.is_origin_listed(origin) {
            return true;
        }
        match (&self.trusted_referer_prefix, referer) {
            (Some(prefix), Some(referer)) => referer.starts_with(prefix.as_str()),
            _ => false,
        }
    }

    /// CORS headers for a response to a request from `origin`.
    pub fn cors_headers(&self, origin: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let allow_origin = match origin {
            Some(o) if self.is_origin_listed(Some(o)) => HeaderValue::from_str(o).ok(),
            _ if self.wildcard_fallback => Some(HeaderValue::from_static("*")),
            _ => None,
        };
        if let Some(value) = allow_origin {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST, OPTIONS"),
        );
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
        headers
    }
}
