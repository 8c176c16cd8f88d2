//! Terminal errors of the relay pipeline and their HTTP rendering.
//!
//! | kind                               | status |
//! |------------------------------------|--------|
//! | bad method / origin / body / field | 4xx    |
//! | throttled                          | 429    |
//! | upstream timeout                   | 504    |
//! | upstream non-JSON                  | 500    |
//! | upstream misconfigured / unknown   | 502    |
//! | missing webhook configuration      | 500    |
//! | anything else                      | 500    |

use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::MessagesConfig;
use crate::http::response::{insert_throttle_headers, json_response};
use crate::security::RateLimitDecision;
use crate::store::StoreError;
use crate::upstream::{ExtractError, UpstreamError};

/// Why a relay request ended without reaching a successful upstream reply.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("unauthorized origin")]
    UnauthorizedOrigin,

    #[error("challenge verification failed")]
    ChallengeFailed,

    #[error("client could not be identified")]
    UnidentifiedClient,

    #[error("rate limit exceeded")]
    RateLimited {
        decision: RateLimitDecision,
        retry_after_secs: u64,
    },

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("request body is not valid JSON")]
    InvalidBody,

    #[error("missing required field: {0}")]
    MissingField(String),

    /// Operator-fixable: the webhook settings are absent or unusable.
    #[error("service configuration error: {0}")]
    Configuration(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("upstream returned non-JSON response (status {status})")]
    UpstreamMalformed { status: u16, details: String },

    #[error("upstream returned status {status}")]
    UpstreamRejected { status: u16 },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upstream(UpstreamError),
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(_) => RelayError::UpstreamTimeout,
            other => RelayError::Upstream(other),
        }
    }
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::UnauthorizedOrigin | RelayError::ChallengeFailed => StatusCode::FORBIDDEN,
            RelayError::UnidentifiedClient
            | RelayError::InvalidBody
            | RelayError::MissingField(_) => StatusCode::BAD_REQUEST,
            RelayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RelayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            RelayError::UpstreamRejected { .. } | RelayError::Extract(_) => StatusCode::BAD_GATEWAY,
            RelayError::Configuration(_)
            | RelayError::UpstreamMalformed { .. }
            | RelayError::Store(_)
            | RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON error body. `expose_internal` controls whether raw error text of
    /// unexpected failures reaches the client.
    pub fn body(&self, messages: &MessagesConfig, expose_internal: bool) -> Value {
        match self {
            RelayError::MethodNotAllowed => json!({ "error": "Method not allowed" }),
            RelayError::UnauthorizedOrigin => json!({
                "error": "Unauthorized origin",
                "message": messages.unauthorized_origin,
            }),
            RelayError::ChallengeFailed => json!({
                "error": "Turnstile verification failed",
                "message": messages.challenge_failed,
            }),
            RelayError::UnidentifiedClient => json!({ "error": "Unidentified client" }),
            RelayError::RateLimited {
                retry_after_secs, ..
            } => json!({
                "error": "Too many requests",
                "message": messages.service_busy,
                "retryAfter": retry_after_secs,
            }),
            RelayError::PayloadTooLarge => json!({ "error": "Payload too large" }),
            RelayError::InvalidBody => json!({ "error": "Invalid JSON body" }),
            RelayError::MissingField(field) => json!({
                "error": format!("Missing required field: {field}"),
            }),
            RelayError::Configuration(_) => json!({ "error": "Service configuration error" }),
            RelayError::UpstreamTimeout => json!({
                "error": "Request timeout",
                "message": messages.service_busy,
            }),
            RelayError::UpstreamMalformed { status, details } => json!({
                "error": "Invalid response from upstream",
                "message": "upstream returned non-JSON response",
                "details": details,
                "status": status,
            }),
            RelayError::UpstreamRejected { status } => json!({
                "error": "Upstream returned an error",
                "status": status,
            }),
            RelayError::Extract(ExtractError::WorkflowStarted) => json!({
                "error": "Upstream workflow misconfigured",
                "message": self.to_string(),
            }),
            RelayError::Extract(ExtractError::UnrecognizedShape { keys }) => json!({
                "error": "Unrecognized upstream response",
                "keys": keys,
            }),
            RelayError::Store(_) | RelayError::Upstream(_) => {
                let message = if expose_internal {
                    self.to_string()
                } else {
                    "An unexpected error occurred".to_string()
                };
                json!({ "error": "Internal server error", "message": message })
            }
        }
    }

    /// Render as a response (without CORS headers).
    pub fn into_response(self, messages: &MessagesConfig, expose_internal: bool) -> Response {
        let mut response = json_response(self.status(), self.body(messages, expose_internal));
        if let RelayError::RateLimited {
            decision,
            retry_after_secs,
        } = &self
        {
            insert_throttle_headers(response.headers_mut(), decision, *retry_after_secs);
        }
        response
    }
}
