//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming POST:
//!     → origin.rs (Origin allow-list / trusted Referer, CORS headers)
//!     → challenge.rs (attestation of the client's challenge token)
//!     → rate_limit.rs (fixed window per client, store-backed)
//!     → Pass to payload validation and the upstream call
//! ```
//!
//! # Design Decisions
//! - Each guard is defined once and composed by the pipeline
//! - Challenge verification fails open only when no secret is configured
//! - Rate limiting is approximate under concurrency

pub mod challenge;
pub mod origin;
pub mod rate_limit;

pub use challenge::{ChallengeMode, ChallengeVerifier};
pub use origin::OriginGuard;
pub use rate_limit::{FixedWindowLimiter, RateLimitDecision, RateLimitRecord};
