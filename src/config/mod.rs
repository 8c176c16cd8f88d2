//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!     → EdgeState built from it, shared via ArcSwap
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the EdgeState
//! ```
//!
//! Webhook URL, auth header and challenge secret are not part of this file;
//! they live in the key-value store (see `settings`).

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ChallengeConfig, CorsConfig, EdgeConfig, ListenerConfig, LogFormat,
    MessagesConfig, ObservabilityConfig, OriginConfig, PayloadConfig, PipelineConfig,
    RateLimitConfig, ResponseMode, SecurityConfig, StoreBackend, StoreConfig,
    UnidentifiedPolicy, UpstreamConfig,
};
