//! Admin API tests: settings management and rate-limit buckets.

use std::net::SocketAddr;

use edge_proxy::admin::run_admin;
use edge_proxy::settings::{AUTH_TOKEN_KEY, WEBHOOK_URL_KEY};
use edge_proxy::store::KvStore;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;
use common::{MockReply, CLIENT_IP, REQUIRED_FIELD};

const ADMIN_KEY: &str = "test-admin-key";

async fn spawn_admin(edge: &common::Edge) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = edge.state.clone();
    let shutdown = edge.shutdown.subscribe();
    tokio::spawn(async move {
        let _ = run_admin(listener, state, shutdown).await;
    });
    addr
}

async fn setup() -> (common::Edge, String) {
    let mut config = common::local_config();
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    let edge = common::spawn_edge(config).await;
    let admin = spawn_admin(&edge).await;
    (edge, format!("http://{admin}"))
}

#[tokio::test]
async fn test_requires_bearer_key() {
    let (_edge, admin) = setup().await;
    let client = common::client();

    let res = client.get(format!("{admin}/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{admin}/admin/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{admin}/admin/status"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "operational");
    assert_eq!(body["store_backend"], "memory");
    assert_eq!(body["response_mode"], "passthrough");
}

#[tokio::test]
async fn test_settings_round_trip_with_redaction() {
    let (edge, admin) = setup().await;
    let client = common::client();

    let res = client
        .put(format!("{admin}/admin/settings/webhook_url"))
        .bearer_auth(ADMIN_KEY)
        .json(&json!({"value": "https://n8n.example.com/webhook/abc"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        edge.store.get(WEBHOOK_URL_KEY).await.unwrap().as_deref(),
        Some("https://n8n.example.com/webhook/abc")
    );

    let res = client
        .put(format!("{admin}/admin/settings/auth_token"))
        .bearer_auth(ADMIN_KEY)
        .json(&json!({"value": "super-secret"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let settings: Vec<Value> = client
        .get(format!("{admin}/admin/settings"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let by_name = |name: &str| {
        settings
            .iter()
            .find(|s| s["name"] == name)
            .cloned()
            .unwrap()
    };
    assert_eq!(by_name("webhook_url")["value"], "https://n8n.example.com/webhook/abc");
    assert_eq!(by_name("auth_token")["value"], "********");
    assert_eq!(by_name("challenge_secret")["value"], Value::Null);

    let res = client
        .delete(format!("{admin}/admin/settings/auth_token"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(edge.store.get(AUTH_TOKEN_KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejects_unknown_and_invalid_settings() {
    let (_edge, admin) = setup().await;
    let client = common::client();

    let res = client
        .put(format!("{admin}/admin/settings/not_a_setting"))
        .bearer_auth(ADMIN_KEY)
        .json(&json!({"value": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .put(format!("{admin}/admin/settings/webhook_url"))
        .bearer_auth(ADMIN_KEY)
        .json(&json!({"value": "not a url"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inspect_and_reset_bucket() {
    let (backend, _) = common::start_mock_backend(MockReply::json(200, json!({"text": "ok"}))).await;
    let (edge, admin) = setup().await;
    edge.store
        .put(WEBHOOK_URL_KEY, &format!("http://{backend}/hook"), None)
        .await
        .unwrap();
    let client = common::client();

    let res = client
        .get(format!("{admin}/admin/ratelimit/{CLIENT_IP}"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let mut payload = serde_json::Map::new();
    payload.insert(REQUIRED_FIELD.to_string(), json!("hello"));
    for _ in 0..3 {
        let res = common::submission(&client, &edge, Value::Object(payload.clone()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let bucket: Value = client
        .get(format!("{admin}/admin/ratelimit/{CLIENT_IP}"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bucket["count"], 3);
    assert_eq!(bucket["limit"], 10);
    assert_eq!(bucket["remaining"], 7);

    let res = client
        .delete(format!("{admin}/admin/ratelimit/{CLIENT_IP}"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = common::submission(&client, &edge, Value::Object(payload))
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-ratelimit-remaining"], "9");
}
