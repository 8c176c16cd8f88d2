use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use url::Url;

use crate::config::ResponseMode;
use crate::http::AppState;
use crate::settings::Setting;
use crate::store::StoreError;

/// Shown instead of a stored secret.
const REDACTED: &str = "********";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("no rate limit bucket for {0}")]
    NoBucket(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminError::UnknownSetting(_) | AdminError::NoBucket(_) => StatusCode::NOT_FOUND,
            AdminError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            AdminError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub store_backend: &'static str,
    pub response_mode: ResponseMode,
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Serialize)]
pub struct SettingView {
    pub name: &'static str,
    pub key: &'static str,
    pub value: Option<String>,
}

#[derive(Deserialize)]
pub struct SettingUpdate {
    pub value: String,
}

#[derive(Serialize)]
pub struct BucketView {
    pub client: String,
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: u64,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = state.current();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        store_backend: inner.store.backend_name(),
        response_mode: inner.config.upstream.response_mode,
        max_requests: inner.config.rate_limit.max_requests,
        window_secs: inner.config.rate_limit.window_secs,
    })
}

pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<Vec<SettingView>>, AdminError> {
    let inner = state.current();
    let mut views = Vec::with_capacity(Setting::ALL.len());
    for setting in Setting::ALL {
        let value = inner.store.get(setting.store_key()).await?;
        views.push(SettingView {
            name: setting.name(),
            key: setting.store_key(),
            value: match value {
                Some(_) if setting.is_secret() => Some(REDACTED.to_string()),
                other => other,
            },
        });
    }
    Ok(Json(views))
}

pub async fn put_setting(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<SettingUpdate>,
) -> Result<StatusCode, AdminError> {
    let setting = Setting::from_name(&name).ok_or(AdminError::UnknownSetting(name))?;
    validate_setting(setting, &update.value)?;

    state
        .current()
        .store
        .put(setting.store_key(), &update.value, None)
        .await?;
    tracing::info!(setting = setting.name(), "Setting updated");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_setting(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AdminError> {
    let setting = Setting::from_name(&name).ok_or(AdminError::UnknownSetting(name))?;
    state.current().store.delete(setting.store_key()).await?;
    tracing::info!(setting = setting.name(), "Setting removed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_bucket(
    State(state): State<AppState>,
    Path(client): Path<String>,
) -> Result<Json<BucketView>, AdminError> {
    let inner = state.current();
    let record = inner
        .limiter
        .peek(&client)
        .await?
        .ok_or_else(|| AdminError::NoBucket(client.clone()))?;

    let limit = inner.limiter.max_requests();
    Ok(Json(BucketView {
        client,
        count: record.count,
        limit,
        remaining: limit.saturating_sub(record.count),
        reset_at: record.reset_at,
    }))
}

pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(client): Path<String>,
) -> Result<StatusCode, AdminError> {
    state.current().limiter.reset(&client).await?;
    tracing::info!(client = %client, "Rate limit bucket reset");
    Ok(StatusCode::NO_CONTENT)
}

fn validate_setting(setting: Setting, value: &str) -> Result<(), AdminError> {
    if value.trim().is_empty() {
        return Err(AdminError::InvalidValue(format!(
            "{} must not be empty; use DELETE to clear it",
            setting.name()
        )));
    }
    match setting {
        Setting::WebhookUrl => {
            let url = Url::parse(value)
                .map_err(|e| AdminError::InvalidValue(format!("webhook_url: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AdminError::InvalidValue(
                    "webhook_url must use http or https".into(),
                ));
            }
        }
        Setting::AuthHeaderName => {
            axum::http::HeaderName::from_bytes(value.as_bytes())
                .map_err(|e| AdminError::InvalidValue(format!("auth_header_name: {e}")))?;
        }
        Setting::AuthToken | Setting::ChallengeSecret => {}
    }
    Ok(())
}
