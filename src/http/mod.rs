//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, reload)
//!     → pipeline.rs (guards, payload, webhook call)
//!         ├── request.rs (client identity, header lookups)
//!         ├── state.rs (per-config snapshot of every component)
//!         └── error.rs (terminal states and their bodies)
//!     → response.rs (JSON bodies, rate-limit headers, CORS merge)
//!     → Send to client
//! ```

pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;
pub mod state;

pub use error::RelayError;
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
pub use state::{AppState, BuildError, EdgeState};
