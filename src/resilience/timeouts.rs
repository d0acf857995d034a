//! Timeout enforcement.
//!
//! Every store, lock and queue service call carries a deadline. A call that
//! misses it fails with [`CircuitBreakerError::Timeout`] and is cancelled.

use std::future::Future;
use std::time::Duration;

use crate::circuit::error::{BreakerResult, CircuitBreakerError};

/// Run `fut` with a deadline of `limit`.
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, fut: F) -> BreakerResult<T>
where
    F: Future<Output = BreakerResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Operation timed out");
            Err(CircuitBreakerError::Timeout {
                operation,
                ms: limit.as_millis() as u64,
            })
        }
    }
}
