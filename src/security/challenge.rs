//! Bot-challenge verification against an attestation service.
//!
//! Fails open when no secret is configured and fails closed on every error
//! once a secret is present.

use std::time::Duration;

use serde::Deserialize;

use crate::config::ChallengeConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;

/// Whether tokens are checked, decided by the presence of a secret.
#[derive(Clone, PartialEq, Eq)]
pub enum ChallengeMode {
    /// No secret configured; every token passes.
    Disabled,
    /// Tokens are sent to the attestation endpoint with this secret.
    Enforced { secret: String },
}

impl std::fmt::Debug for ChallengeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeMode::Disabled => write!(f, "Disabled"),
            ChallengeMode::Enforced { .. } => write!(f, "Enforced {{ secret: <redacted> }}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Client for the attestation endpoint.
#[derive(Debug, Clone)]
pub struct ChallengeVerifier {
    http: reqwest::Client,
    verify_url: String,
    timeout: Duration,
}

impl ChallengeVerifier {
    pub fn new(http: reqwest::Client, config: &ChallengeConfig) -> Self {
        Self {
            http,
            verify_url: config.verify_url.clone(),
            timeout: config.timeout(),
        }
    }

    /// Check `token` for `client_id`. Transport, timeout and parse failures
    /// count as a failed verification.
    pub async fn verify(&self, mode: &ChallengeMode, token: &str, client_id: &str) -> bool {
        let secret = match mode {
            ChallengeMode::Disabled => {
                tracing::debug!("Challenge secret not configured, skipping verification");
                metrics::record_challenge("skipped");
                return true;
            }
            ChallengeMode::Enforced { secret } => secret,
        };

        let form = [
            ("secret", secret.as_str()),
            ("response", token),
            ("remoteip", client_id),
        ];
        let call = async {
            self.http
                .post(&self.verify_url)
                .form(&form)
                .send()
                .await?
                .json::<SiteVerifyResponse>()
                .await
        };

        let passed = match with_deadline(self.timeout, call).await {
            Ok(Ok(outcome)) => {
                if !outcome.success {
                    tracing::info!(
                        client = %client_id,
                        error_codes = ?outcome.error_codes,
                        "Challenge token rejected"
                    );
                }
                outcome.success
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Challenge verification request failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Challenge verification timed out");
                false
            }
        };

        metrics::record_challenge(if passed { "passed" } else { "failed" });
        passed
    }
}
