//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use edge_proxy::config::EdgeConfig;
use edge_proxy::http::{AppState, HttpServer};
use edge_proxy::lifecycle::Shutdown;
use edge_proxy::store::{MemoryStore, SharedStore};

pub const ALLOWED_ORIGIN: &str = "http://localhost:8000";
pub const CLIENT_IP: &str = "198.51.100.7";
pub const REQUIRED_FIELD: &str = "問い合わせ内容";

/// What a mock backend answers.
#[derive(Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
    pub delay: Duration,
}

impl MockReply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            content_type: "application/json",
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            content_type: "text/html",
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Raw requests received by a mock backend, head and body as text.
pub type Captured = Arc<Mutex<Vec<String>>>;

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Captured)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let seen = captured.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            let seen = seen.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);

                let reply = f().await;
                tokio::time::sleep(reply.delay).await;
                let response = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.status,
                    reply.content_type,
                    reply.body.len(),
                    reply.body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, captured)
}

/// Start a mock backend that always answers with `reply`.
pub async fn start_mock_backend(reply: MockReply) -> (SocketAddr, Captured) {
    start_programmable_backend(move || {
        let reply = reply.clone();
        async move { reply }
    })
    .await
}

/// Read one HTTP/1.1 request: head plus `Content-Length` bytes of body.
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// A running relay server.
pub struct Edge {
    pub addr: SocketAddr,
    pub store: SharedStore,
    pub state: AppState,
    pub config_updates: mpsc::UnboundedSender<EdgeConfig>,
    pub shutdown: Shutdown,
}

impl Edge {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

/// Start the relay on an ephemeral port with a fresh memory store.
pub async fn spawn_edge(mut config: EdgeConfig) -> Edge {
    config.observability.metrics_enabled = false;
    let store: SharedStore = Arc::new(MemoryStore::new());

    let server = HttpServer::new(config, store.clone()).unwrap();
    let state = server.state();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    Edge {
        addr,
        store,
        state,
        config_updates,
        shutdown,
    }
}

/// Client that bypasses any system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// A browser-like POST from an allowed origin and a fixed client IP.
pub fn submission(client: &reqwest::Client, edge: &Edge, body: serde_json::Value) -> reqwest::RequestBuilder {
    client
        .post(edge.url())
        .header("Origin", ALLOWED_ORIGIN)
        .header("CF-Connecting-IP", CLIENT_IP)
        .json(&body)
}

/// Config that never leaves loopback.
pub fn local_config() -> EdgeConfig {
    let mut config = EdgeConfig::default();
    config.upstream.system_proxy = false;
    config
}
