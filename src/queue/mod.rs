//! Queueing service client.
//!
//! The breaker never moves messages itself; it only asks the queueing
//! service to hold (`put_lock`) or release (`delete_lock`) a queue.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::lifecycle::defer_close::{Close, DeferClose};

pub use http::HttpQueueService;

/// Owner label attached to every lock the breaker places.
pub const LOCK_OWNER: &str = "queue_circuit_breaker";

/// Reply of the queueing service to a lock operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error(String),
}

impl ReplyStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ReplyStatus::Ok)
    }
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyStatus::Ok => f.write_str("ok"),
            ReplyStatus::Error(status) => f.write_str(status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueServiceError {
    /// The request never produced a reply.
    #[error("queue service request failed: {0}")]
    Request(String),

    /// The client is shutting down and accepts no new calls.
    #[error("queue service client is closed")]
    Closed,
}

#[async_trait]
pub trait QueueService: Send + Sync {
    /// Lock `queue` so the queueing service stops processing it.
    async fn put_lock(&self, queue: &str, owner: &str) -> Result<ReplyStatus, QueueServiceError>;

    /// Remove the lock from `queue`.
    async fn delete_lock(&self, queue: &str) -> Result<ReplyStatus, QueueServiceError>;
}

#[async_trait]
impl<T> QueueService for DeferClose<T>
where
    T: QueueService + Close,
{
    async fn put_lock(&self, queue: &str, owner: &str) -> Result<ReplyStatus, QueueServiceError> {
        let inner = self.acquire().ok_or(QueueServiceError::Closed)?;
        inner.put_lock(queue, owner).await
    }

    async fn delete_lock(&self, queue: &str) -> Result<ReplyStatus, QueueServiceError> {
        let inner = self.acquire().ok_or(QueueServiceError::Closed)?;
        inner.delete_lock(queue).await
    }
}
