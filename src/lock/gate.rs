//! Run a task body under a cluster-wide lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit::error::CircuitBreakerError;
use crate::circuit::statistics::unix_millis;
use crate::lock::DistributedLock;

/// What happened on one gated tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    /// This instance held the lock and the body succeeded.
    Ran(T),
    /// Another instance holds the lock, or the lock backend failed.
    Skipped,
    /// The body failed; the lock has been released.
    Failed(CircuitBreakerError),
}

impl<T> GateOutcome<T> {
    pub fn label(&self) -> &'static str {
        match self {
            GateOutcome::Ran(_) => "ran",
            GateOutcome::Skipped => "skipped",
            GateOutcome::Failed(_) => "failed",
        }
    }
}

/// Hold time for a task running every `interval_ms`: half the interval,
/// at least 1ms.
pub fn lock_expiry(interval_ms: u64) -> Duration {
    if interval_ms <= 1 {
        return Duration::from_millis(1);
    }
    Duration::from_millis(interval_ms / 2)
}

/// Acquires named locks on behalf of one gateway instance.
#[derive(Clone)]
pub struct LockGate {
    lock: Arc<dyn DistributedLock>,
    instance_id: String,
    acquire_timeout: Duration,
}

impl LockGate {
    pub fn new(lock: Arc<dyn DistributedLock>, instance_id: impl Into<String>, acquire_timeout: Duration) -> Self {
        Self {
            lock,
            instance_id: instance_id.into(),
            acquire_timeout,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Fresh owner token: `{instance}_{now_ms}_{purpose}`.
    pub fn create_token(&self, purpose: &str) -> String {
        format!("{}_{}_{}", self.instance_id, unix_millis(), purpose)
    }

    /// Run `action` if this instance wins `name` for the current interval.
    ///
    /// The lock is kept after success and released after failure.
    pub async fn with_lock<T, F, Fut>(&self, name: &'static str, interval_ms: u64, action: F) -> GateOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CircuitBreakerError>>,
    {
        let token = self.create_token(name);
        let expiry = lock_expiry(interval_ms);

        let acquired = tokio::time::timeout(
            self.acquire_timeout,
            self.lock.acquire(name, &token, expiry),
        )
        .await;

        match acquired {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                tracing::trace!(lock = name, "Lock held by another instance, skipping");
                return GateOutcome::Skipped;
            }
            Ok(Err(e)) => {
                tracing::error!(lock = name, error = %e, "Could not acquire lock");
                return GateOutcome::Skipped;
            }
            Err(_) => {
                tracing::error!(lock = name, "Could not acquire lock: timed out");
                return GateOutcome::Skipped;
            }
        }

        match action().await {
            Ok(value) => GateOutcome::Ran(value),
            Err(e) => {
                if let Err(release_err) = self.lock.release(name, &token).await {
                    tracing::warn!(lock = name, error = %release_err, "Failed to release lock");
                }
                GateOutcome::Failed(e)
            }
        }
    }
}

impl std::fmt::Debug for LockGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGate")
            .field("instance_id", &self.instance_id)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}
