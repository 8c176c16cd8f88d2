//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call (upstream webhook, attestation service):
//!     → timeouts.rs (enforce deadline, cancel on expiry)
//!     → failure surfaced to the caller as-is
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - No retries; the relayed POST is not idempotent

pub mod timeouts;
