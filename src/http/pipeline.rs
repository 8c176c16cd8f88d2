//! The relay pipeline.
//!
//! ```text
//! OPTIONS → 204
//! method gate → origin guard → client id → settings → challenge
//!     → limiter → payload → webhook target → upstream call → reply
//! ```
//!
//! Each stage either passes or ends the request with a [`RelayError`].
//! CORS headers are attached to whatever comes out, success or error.
//! The whole run is bounded by a deadline read from the live config, so a
//! reload that changes the upstream timeout applies to the next request.

use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use url::Url;

use crate::config::ResponseMode;
use crate::http::error::RelayError;
use crate::http::request::{client_identity, header_str};
use crate::http::response::{extend_headers, insert_rate_limit_headers, json_response};
use crate::http::state::{AppState, EdgeState};
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::security::rate_limit::now_millis;
use crate::settings::RuntimeSettings;
use crate::upstream::client::diagnostic_prefix;
use crate::upstream::{extract_text, UpstreamBody, UpstreamReply, UpstreamTarget};

/// Room left past the upstream and challenge deadlines so their own
/// errors surface first.
const RELAY_DEADLINE_SLACK: Duration = Duration::from_secs(5);

/// Entry point for every path except the health probe.
pub async fn relay_handler(State(app): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let state = app.current();

    let method = request.method().to_string();
    let cors = state
        .origin_guard
        .cors_headers(header_str(request.headers(), header::ORIGIN));

    let outcome = with_deadline(state.relay_deadline(), state.relay(request))
        .await
        .unwrap_or(Err(RelayError::UpstreamTimeout));

    let mut response = match outcome {
        Ok(response) => response,
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                tracing::error!(error = %err, status = status.as_u16(), "Relay failed");
            } else {
                tracing::info!(error = %err, status = status.as_u16(), "Request refused");
            }
            err.into_response(
                &state.config.messages,
                state.config.security.expose_internal_errors,
            )
        }
    };

    extend_headers(&mut response, cors);
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

impl EdgeState {
    /// Outer bound on one relay run: body read, challenge and upstream call.
    pub fn relay_deadline(&self) -> Duration {
        self.config
            .upstream
            .timeout()
            .saturating_add(self.config.challenge.timeout())
            .saturating_add(RELAY_DEADLINE_SLACK)
    }

    /// Run one request through every stage.
    pub async fn relay(&self, request: Request<Body>) -> Result<Response, RelayError> {
        if request.method() == Method::OPTIONS {
            return Ok(StatusCode::NO_CONTENT.into_response());
        }
        if request.method() != Method::POST {
            return Err(RelayError::MethodNotAllowed);
        }

        let headers = request.headers();
        if self.config.pipeline.origin_guard {
            let origin = header_str(headers, header::ORIGIN);
            let referer = header_str(headers, header::REFERER);
            if !self.origin_guard.is_allowed(origin, referer) {
                tracing::warn!(origin = ?origin, referer = ?referer, "Rejected origin");
                return Err(RelayError::UnauthorizedOrigin);
            }
        }

        let client_id = client_identity(&request, &self.config.rate_limit)?;
        let settings = RuntimeSettings::load(self.store.as_ref()).await?;

        if self.config.pipeline.challenge {
            let token = header_str(request.headers(), self.config.challenge.token_header.as_str());
            self.check_challenge(&settings, token, &client_id).await?;
        }

        let decision = self.limiter.check_and_consume(&client_id).await?;
        if !decision.allowed {
            metrics::record_rate_limited("window");
            tracing::warn!(client = %client_id, reset_at = decision.reset_at, "Rate limit exceeded");
            return Err(RelayError::RateLimited {
                decision,
                retry_after_secs: decision.retry_after_secs(now_millis()),
            });
        }

        let payload = self.read_payload(request).await?;
        let target = webhook_target(&settings)?;

        tracing::debug!(client = %client_id, url = %target.url, "Forwarding to webhook");
        let reply = match self.upstream.send(&target, &payload).await {
            Ok(reply) => reply,
            Err(err) => {
                let err = RelayError::from(err);
                let outcome = match err {
                    RelayError::UpstreamTimeout => "timeout",
                    _ => "error",
                };
                metrics::record_upstream(outcome);
                return Err(err);
            }
        };

        let mut response = self.render_reply(reply)?;
        insert_rate_limit_headers(response.headers_mut(), &decision);
        Ok(response)
    }

    async fn check_challenge(
        &self,
        settings: &RuntimeSettings,
        token: Option<&str>,
        client_id: &str,
    ) -> Result<(), RelayError> {
        let mode = settings.challenge_mode();
        match token {
            Some(token) => {
                if self.challenge.verify(&mode, token, client_id).await {
                    Ok(())
                } else {
                    Err(RelayError::ChallengeFailed)
                }
            }
            None if self.config.challenge.require_token && settings.challenge_secret.is_some() => {
                metrics::record_challenge("missing");
                Err(RelayError::ChallengeFailed)
            }
            None => Ok(()),
        }
    }

    /// Bounded body read, JSON parse and required-field check.
    async fn read_payload(&self, request: Request<Body>) -> Result<Value, RelayError> {
        let limit = self.config.payload.max_body_bytes;

        let declared = header_str(request.headers(), header::CONTENT_LENGTH)
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(RelayError::PayloadTooLarge);
        }

        let bytes = to_bytes(request.into_body(), limit)
            .await
            .map_err(|_| RelayError::PayloadTooLarge)?;
        let payload: Value =
            serde_json::from_slice(&bytes).map_err(|_| RelayError::InvalidBody)?;

        let field = &self.config.payload.required_field;
        if is_falsy(payload.get(field)) {
            return Err(RelayError::MissingField(field.clone()));
        }
        Ok(payload)
    }

    fn render_reply(&self, reply: UpstreamReply) -> Result<Response, RelayError> {
        let json = match reply.body {
            UpstreamBody::Raw(raw) => {
                metrics::record_upstream("malformed");
                return Err(RelayError::UpstreamMalformed {
                    status: reply.status,
                    details: diagnostic_prefix(&raw),
                });
            }
            UpstreamBody::Json(json) => json,
        };
        metrics::record_upstream("ok");

        match self.config.upstream.response_mode {
            ResponseMode::Passthrough => {
                let status =
                    StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
                Ok(json_response(status, json))
            }
            ResponseMode::Normalize => {
                if !(200..300).contains(&reply.status) {
                    return Err(RelayError::UpstreamRejected {
                        status: reply.status,
                    });
                }
                let text = extract_text(&json)?;
                Ok(json_response(StatusCode::OK, json!({ "text": text })))
            }
        }
    }
}

/// Build the call target from the current settings.
fn webhook_target(settings: &RuntimeSettings) -> Result<UpstreamTarget, RelayError> {
    let raw = settings
        .webhook_url
        .as_deref()
        .ok_or_else(|| RelayError::Configuration("webhook URL is not set".into()))?;
    let url = Url::parse(raw)
        .map_err(|e| RelayError::Configuration(format!("webhook URL is invalid: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RelayError::Configuration(format!(
            "webhook URL scheme {} is not http(s)",
            url.scheme()
        )));
    }

    let auth = match &settings.auth_token {
        Some(token) => {
            let name = HeaderName::from_bytes(settings.auth_header_name.as_bytes())
                .map_err(|e| RelayError::Configuration(format!("auth header name: {e}")))?;
            let value = HeaderValue::from_str(token)
                .map_err(|e| RelayError::Configuration(format!("auth token: {e}")))?;
            Some((name, value))
        }
        None => None,
    };

    Ok(UpstreamTarget { url, auth })
}

/// Missing, null, false, zero and the empty string.
fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EdgeConfig;
    use crate::settings::{AUTH_TOKEN_KEY, WEBHOOK_URL_KEY};
    use crate::store::{KvStore, MemoryStore, SharedStore};
    use std::sync::Arc;

    fn state_with(config: EdgeConfig) -> (EdgeState, SharedStore) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        (EdgeState::build(config, store.clone()).unwrap(), store)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("Origin", "http://localhost:8000")
            .header("CF-Connecting-IP", "198.51.100.7")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_falsy_values() {
        assert!(is_falsy(None));
        assert!(is_falsy(Some(&json!(null))));
        assert!(is_falsy(Some(&json!(false))));
        assert!(is_falsy(Some(&json!(0))));
        assert!(is_falsy(Some(&json!(""))));
        assert!(!is_falsy(Some(&json!("質問"))));
        assert!(!is_falsy(Some(&json!(1))));
        assert!(!is_falsy(Some(&json!([]))));
    }

    #[test]
    fn test_webhook_target_validation() {
        let mut settings = RuntimeSettings {
            auth_header_name: "Authorization".into(),
            ..Default::default()
        };
        assert!(matches!(
            webhook_target(&settings),
            Err(RelayError::Configuration(_))
        ));

        settings.webhook_url = Some("ftp://example.com/hook".into());
        assert!(matches!(
            webhook_target(&settings),
            Err(RelayError::Configuration(_))
        ));

        settings.webhook_url = Some("https://n8n.example.com/webhook/abc".into());
        let target = webhook_target(&settings).unwrap();
        assert!(target.auth.is_none());

        settings.auth_token = Some("Bearer s3cret".into());
        let target = webhook_target(&settings).unwrap();
        let (name, value) = target.auth.unwrap();
        assert_eq!(name, header::AUTHORIZATION);
        assert_eq!(value, "Bearer s3cret");
    }

    #[tokio::test]
    async fn test_preflight_skips_store() {
        let (state, store) = state_with(EdgeConfig::default());
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/")
            .body(Body::empty())
            .unwrap();

        let response = state.relay(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(store.get("ratelimit:unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_origin_does_not_consume() {
        let (state, store) = state_with(EdgeConfig::default());
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("Origin", "https://evil.example")
            .header("CF-Connecting-IP", "198.51.100.7")
            .body(Body::from("{}"))
            .unwrap();

        let err = state.relay(request).await.unwrap_err();
        assert!(matches!(err, RelayError::UnauthorizedOrigin));
        assert!(store.get("ratelimit:198.51.100.7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_payload_checks() {
        let (state, _) = state_with(EdgeConfig::default());

        let err = state.relay(post("not json")).await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidBody));

        let err = state.relay(post(r#"{"問い合わせ内容": ""}"#)).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingField(ref f) if f == "問い合わせ内容"));
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let mut config = EdgeConfig::default();
        config.payload.max_body_bytes = 16;
        let (state, _) = state_with(config);

        let body = format!(r#"{{"問い合わせ内容": "{}"}}"#, "x".repeat(64));
        let err = state.relay(post(&body)).await.unwrap_err();
        assert!(matches!(err, RelayError::PayloadTooLarge));
    }

    #[tokio::test]
    async fn test_missing_webhook_is_configuration_error() {
        let (state, store) = state_with(EdgeConfig::default());
        store.put(AUTH_TOKEN_KEY, "token", None).await.unwrap();
        assert!(store.get(WEBHOOK_URL_KEY).await.unwrap().is_none());

        let err = state
            .relay(post(r#"{"問い合わせ内容": "hello"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_missing_token_with_require_token() {
        let mut config = EdgeConfig::default();
        config.challenge.require_token = true;
        let (state, store) = state_with(config);
        store
            .put(crate::settings::CHALLENGE_SECRET_KEY, "secret", None)
            .await
            .unwrap();

        let err = state
            .relay(post(r#"{"問い合わせ内容": "hello"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ChallengeFailed));
    }

    #[tokio::test]
    async fn test_normalize_rejects_error_status() {
        let mut config = EdgeConfig::default();
        config.upstream.response_mode = ResponseMode::Normalize;
        let (state, _) = state_with(config);

        let err = state
            .render_reply(UpstreamReply {
                status: 500,
                body: UpstreamBody::Json(json!({"text": "boom"})),
            })
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamRejected { status: 500 }));

        let response = state
            .render_reply(UpstreamReply {
                status: 200,
                body: UpstreamBody::Json(json!({"output": {"content": "こんにちは"}})),
            })
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_passthrough_keeps_status_and_raw_is_malformed() {
        let (state, _) = state_with(EdgeConfig::default());

        let response = state
            .render_reply(UpstreamReply {
                status: 201,
                body: UpstreamBody::Json(json!({"ok": true})),
            })
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let err = state
            .render_reply(UpstreamReply {
                status: 200,
                body: UpstreamBody::Raw("<html>".into()),
            })
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamMalformed { status: 200, .. }));
    }

    #[test]
    fn test_relay_deadline_tracks_config() {
        let mut config = EdgeConfig::default();
        config.upstream.timeout_secs = 30;
        config.challenge.timeout_secs = 2;
        let (state, _) = state_with(config);
        assert_eq!(state.relay_deadline(), Duration::from_secs(37));

        let mut config = EdgeConfig::default();
        config.upstream.timeout_secs = u64::MAX;
        let (state, _) = state_with(config);
        assert_eq!(state.relay_deadline(), Duration::MAX);
    }
}
