//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → relay server, admin server, store sweeper stop
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - Servers stop accepting and drain in-flight requests

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
