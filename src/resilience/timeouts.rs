//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap outbound calls (upstream webhook, attestation) with a deadline
//! - Cancel the wrapped operation when the deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry,
//!   which aborts an in-flight reqwest call and closes its connection
//! - Timeout errors are distinct from other errors
//! - Timed-out upstream calls return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The deadline passed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Run `fut` for at most `limit`.
pub async fn with_deadline<F, T>(limit: Duration, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DeadlineExceeded(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fast_future_completes() {
        let value = with_deadline(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_slow_future_is_cancelled() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let result = with_deadline(Duration::from_millis(20), async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await;

        assert_eq!(result, Err(DeadlineExceeded(Duration::from_millis(20))));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Dropped, so the tail never ran
        assert!(!finished.load(Ordering::SeqCst));
    }
}
