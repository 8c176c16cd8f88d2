//! Response construction.
//!
//! # Responsibilities
//! - JSON bodies with the right content type
//! - Rate-limit headers on admitted and refused requests
//!
//! CORS headers are added last, by the relay handler, so every terminal
//! state carries them.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::security::RateLimitDecision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// A JSON response with the given status.
pub fn json_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
}

/// Headers for a refused request: the rate-limit pair plus reset and retry hints.
pub fn insert_throttle_headers(
    headers: &mut HeaderMap,
    decision: &RateLimitDecision,
    retry_after_secs: u64,
) {
    insert_rate_limit_headers(headers, decision);
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at));
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
}

/// Copy `extra` into the response, replacing existing values.
pub fn extend_headers(response: &mut Response, extra: HeaderMap) {
    let headers = response.headers_mut();
    for (name, value) in extra.iter() {
        headers.insert(name.clone(), value.clone());
    }
}
