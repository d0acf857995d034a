//! Error definitions for circuit breaker operations.

use thiserror::Error;

/// Errors surfaced by the store, the coordinator and the maintenance tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitBreakerError {
    /// The request does not resolve to any circuit. Callers skip circuit
    /// breaking for such requests.
    #[error("{}", no_mapping_message(.queue, .uri))]
    NoMapping { queue: Option<String>, uri: String },

    /// The backing store failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Locking a queue on the queueing service failed or was rejected.
    #[error("failed to lock queue '{queue}': {reason}")]
    QueueService { queue: String, reason: String },

    /// Unlocking a queue failed. The payload is the queue name.
    #[error("{0}")]
    UnlockFailed(String),

    /// Some sample queues could not be unlocked; the others were.
    #[error("The following queues could not be unlocked: {0:?}")]
    SampleQueueUnlock(Vec<String>),

    /// A store, lock or queue service call did not complete in time.
    #[error("{operation} timed out after {ms}ms")]
    Timeout { operation: &'static str, ms: u64 },
}

fn no_mapping_message(queue: &Option<String>, uri: &str) -> String {
    match queue {
        Some(queue) => format!(
            "no rule to circuit mapping found for queue '{}' and uri {}",
            queue, uri
        ),
        None => format!("no rule to circuit mapping found for uri {}", uri),
    }
}

impl CircuitBreakerError {
    /// Returns `true` if the request simply is not protected by a circuit.
    pub fn is_no_mapping(&self) -> bool {
        matches!(self, Self::NoMapping { .. })
    }

    /// Returns `true` if the failure is transient and a later tick may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Timeout { .. })
    }
}

/// Result type for circuit breaker operations.
pub type BreakerResult<T> = Result<T, CircuitBreakerError>;
