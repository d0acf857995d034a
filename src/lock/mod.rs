//! Cluster-wide mutual exclusion for periodic tasks.
//!
//! # Data Flow
//! ```text
//! scheduler tick
//!     → gate.rs (token, expiry, acquire)
//!     → DistributedLock backend (memory.rs or a shared service)
//!     → task body runs on at most one instance per interval
//! ```
//!
//! # Design Decisions
//! - Locks are never released after success; expiry bounds the hold time
//! - A failed task body releases the lock so another instance may retry

pub mod gate;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use gate::{lock_expiry, GateOutcome, LockGate};
pub use memory::InMemoryLock;

/// Errors raised by a lock backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("lock backend unavailable: {0}")]
    Unavailable(String),

    #[error("acquiring lock '{0}' timed out")]
    Timeout(String),
}

/// A named lock with owner tokens and expiry, shared by all instances.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Take `name` for `expiry` if it is free or expired.
    ///
    /// Returns `false` if another token holds it.
    async fn acquire(&self, name: &str, token: &str, expiry: Duration) -> Result<bool, LockError>;

    /// Give `name` back. Only the holding token may release.
    async fn release(&self, name: &str, token: &str) -> Result<bool, LockError>;
}
