//! Request inspection.
//!
//! # Responsibilities
//! - Request ID generation and the tracing span that carries it
//! - Client identity for rate limiting
//! - Header lookups the guards need (Origin, Referer, challenge token)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The socket peer is only used as identity when explicitly trusted

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderName, Request};
use tracing::Span;

use crate::config::{RateLimitConfig, UnidentifiedPolicy};
use crate::http::error::RelayError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Bucket shared by every request without an identity under
/// [`UnidentifiedPolicy::Shared`].
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Span for one request, tagged with the ID set by `SetRequestIdLayer`.
pub fn request_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// First non-empty value of a header as UTF-8.
pub fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the identity the limiter counts requests against.
///
/// Order: the configured edge header, then the socket peer when trusted,
/// then the unidentified policy.
pub fn client_identity<B>(
    request: &Request<B>,
    config: &RateLimitConfig,
) -> Result<String, RelayError> {
    if let Some(ip) = header_str(request.headers(), config.client_ip_header.as_str()) {
        return Ok(ip.to_string());
    }

    if config.trust_peer_address {
        if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
            return Ok(addr.ip().to_string());
        }
    }

    match config.unidentified {
        UnidentifiedPolicy::Shared => Ok(UNKNOWN_CLIENT.to_string()),
        UnidentifiedPolicy::Reject => Err(RelayError::UnidentifiedClient),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_edge_header_wins() {
        let mut req = request(&[("CF-Connecting-IP", "203.0.113.9")]);
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("10.0.0.1:5000".parse().unwrap()));
        let config = RateLimitConfig {
            trust_peer_address: true,
            ..Default::default()
        };
        assert_eq!(client_identity(&req, &config).unwrap(), "203.0.113.9");
    }

    #[test]
    fn test_peer_address_only_when_trusted() {
        let mut req = request(&[]);
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("10.0.0.1:5000".parse().unwrap()));

        let config = RateLimitConfig::default();
        assert_eq!(client_identity(&req, &config).unwrap(), UNKNOWN_CLIENT);

        let trusted = RateLimitConfig {
            trust_peer_address: true,
            ..Default::default()
        };
        assert_eq!(client_identity(&req, &trusted).unwrap(), "10.0.0.1");
    }

    #[test]
    fn test_reject_policy() {
        let config = RateLimitConfig {
            unidentified: UnidentifiedPolicy::Reject,
            ..Default::default()
        };
        assert!(matches!(
            client_identity(&request(&[]), &config),
            Err(RelayError::UnidentifiedClient)
        ));
    }

    #[test]
    fn test_blank_header_is_absent() {
        let req = request(&[("CF-Connecting-IP", "  ")]);
        assert_eq!(
            client_identity(&req, &RateLimitConfig::default()).unwrap(),
            UNKNOWN_CLIENT
        );
    }
}
