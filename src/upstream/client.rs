//! Webhook client.
//!
//! Sends the submitted JSON to the configured webhook and classifies the
//! reply. The whole exchange (connect, send, read body) runs under one
//! deadline; on expiry the request future is dropped, aborting the call.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::resilience::timeouts::with_deadline;

/// Characters of a non-JSON body kept for diagnostics.
pub const DIAGNOSTIC_PREFIX_CHARS: usize = 200;

/// Where and how to call the webhook for one request.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub url: Url,
    /// Auth header sent only when a token is configured.
    pub auth: Option<(HeaderName, HeaderValue)>,
}

/// Body of an upstream reply.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    /// Body that failed to parse as JSON.
    Raw(String),
}

/// Upstream reply: status plus classified body.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: UpstreamBody,
}

/// Failures calling the webhook.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the automation webhook.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl WebhookClient {
    pub fn new(http: reqwest::Client, config: &UpstreamConfig) -> Self {
        Self {
            http,
            timeout: config.timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `body` to the target and read the full reply.
    pub async fn send(&self, target: &UpstreamTarget, body: &Value) -> Result<UpstreamReply, UpstreamError> {
        let mut request = self.http.post(target.url.clone()).json(body);
        if let Some((name, value)) = &target.auth {
            request = request.header(name.clone(), value.clone());
        }

        let call = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = with_deadline(self.timeout, call)
            .await
            .map_err(|e| UpstreamError::Timeout(e.0))??;

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(json) => UpstreamBody::Json(json),
            Err(_) => UpstreamBody::Raw(text),
        };
        Ok(UpstreamReply { status, body })
    }
}

/// The first [`DIAGNOSTIC_PREFIX_CHARS`] characters of a raw body.
pub fn diagnostic_prefix(raw: &str) -> String {
    raw.chars().take(DIAGNOSTIC_PREFIX_CHARS).collect()
}
