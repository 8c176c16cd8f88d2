//! Webhook edge proxy library.
//!
//! A public endpoint that admits browser submissions (CORS, origin guard,
//! optional bot challenge, per-client fixed-window rate limit), validates the
//! payload and relays it to an automation webhook whose address and
//! credentials live in a key-value store.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod settings;
pub mod store;
pub mod upstream;

pub use config::EdgeConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
