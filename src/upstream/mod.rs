//! Upstream webhook subsystem.
//!
//! # Data Flow
//! ```text
//! validated payload + RuntimeSettings
//!     → client.rs (POST with auth header, bounded deadline)
//!     → UpstreamReply { status, Json | Raw }
//!     → extract.rs (normalize mode and the CLI: pick the result text)
//! ```

pub mod client;
pub mod extract;

pub use client::{UpstreamBody, UpstreamError, UpstreamReply, UpstreamTarget, WebhookClient};
pub use extract::{extract_text, ExtractError, ResponseShape};
