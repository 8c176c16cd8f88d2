//! Runtime settings held in the key-value store.
//!
//! The webhook target, its auth header and the challenge secret are edited
//! at runtime (admin API, `edge-cli set`, or any tool that writes the store)
//! and read once per request into a [`RuntimeSettings`] value.

use crate::security::challenge::ChallengeMode;
use crate::store::{KvStore, StoreError};

pub const WEBHOOK_URL_KEY: &str = "n8n_webhook_url";
pub const AUTH_HEADER_NAME_KEY: &str = "n8n_auth_header_name";
pub const AUTH_TOKEN_KEY: &str = "n8n_auth_token";
pub const CHALLENGE_SECRET_KEY: &str = "turnstile_secret_key";

/// Header used for the upstream token when no name is stored.
pub const DEFAULT_AUTH_HEADER: &str = "Authorization";

/// A setting addressable by name through the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    WebhookUrl,
    AuthHeaderName,
    AuthToken,
    ChallengeSecret,
}

impl Setting {
    pub const ALL: [Setting; 4] = [
        Setting::WebhookUrl,
        Setting::AuthHeaderName,
        Setting::AuthToken,
        Setting::ChallengeSecret,
    ];

    /// Parse the admin-facing name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "webhook_url" => Some(Setting::WebhookUrl),
            "auth_header_name" => Some(Setting::AuthHeaderName),
            "auth_token" => Some(Setting::AuthToken),
            "challenge_secret" => Some(Setting::ChallengeSecret),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Setting::WebhookUrl => "webhook_url",
            Setting::AuthHeaderName => "auth_header_name",
            Setting::AuthToken => "auth_token",
            Setting::ChallengeSecret => "challenge_secret",
        }
    }

    /// Store key the setting lives under.
    pub fn store_key(self) -> &'static str {
        match self {
            Setting::WebhookUrl => WEBHOOK_URL_KEY,
            Setting::AuthHeaderName => AUTH_HEADER_NAME_KEY,
            Setting::AuthToken => AUTH_TOKEN_KEY,
            Setting::ChallengeSecret => CHALLENGE_SECRET_KEY,
        }
    }

    /// Secrets are never echoed back by the admin API.
    pub fn is_secret(self) -> bool {
        matches!(self, Setting::AuthToken | Setting::ChallengeSecret)
    }
}

/// Settings snapshot for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub webhook_url: Option<String>,
    pub auth_header_name: String,
    pub auth_token: Option<String>,
    pub challenge_secret: Option<String>,
}

impl RuntimeSettings {
    /// Read every setting from the store. Empty strings count as absent.
    pub async fn load(store: &dyn KvStore) -> Result<Self, StoreError> {
        let (webhook_url, auth_header_name, auth_token, challenge_secret) = tokio::try_join!(
            store.get(WEBHOOK_URL_KEY),
            store.get(AUTH_HEADER_NAME_KEY),
            store.get(AUTH_TOKEN_KEY),
            store.get(CHALLENGE_SECRET_KEY),
        )?;

        Ok(Self {
            webhook_url: non_empty(webhook_url),
            auth_header_name: non_empty(auth_header_name)
                .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string()),
            auth_token: non_empty(auth_token),
            challenge_secret: non_empty(challenge_secret),
        })
    }

    /// Verification mode implied by the presence of a secret.
    pub fn challenge_mode(&self) -> ChallengeMode {
        match &self.challenge_secret {
            Some(secret) => ChallengeMode::Enforced {
                secret: secret.clone(),
            },
            None => ChallengeMode::Disabled,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
