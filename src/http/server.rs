//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: health probe plus the relay on every other path
//! - Wire up middleware (request ID, tracing)
//! - Apply config reloads by swapping the shared state
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;

use axum::{
    body::Body,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::EdgeConfig;
use crate::http::pipeline::relay_handler;
use crate::http::request::{request_span, X_REQUEST_ID};
use crate::http::state::{AppState, BuildError, EdgeState};
use crate::store::SharedStore;

/// HTTP server for the edge proxy.
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and store.
    pub fn new(config: EdgeConfig, store: SharedStore) -> Result<Self, BuildError> {
        let state = AppState::new(EdgeState::build(config, store)?);
        Ok(Self { state })
    }

    /// Handle to the shared state, for the admin API.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/", any(relay_handler))
            .route("/{*path}", any(relay_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Config updates received on `config_updates` rebuild the shared state.
    /// The listener address is fixed for the life of the process.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<EdgeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(apply_reloads(self.state.clone(), config_updates));

        let app = Self::build_router(self.state).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_reloads(state: AppState, mut updates: mpsc::UnboundedReceiver<EdgeConfig>) {
    while let Some(config) = updates.recv().await {
        match state.current().rebuild(config) {
            Ok(next) => {
                state.replace(next);
                tracing::info!("Configuration reloaded");
            }
            Err(e) => {
                tracing::error!(error = %e, "Keeping previous configuration");
            }
        }
    }
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
