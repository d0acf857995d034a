//! Queue circuit breaker coordinator.
//!
//! # Responsibilities
//! - Resolve queued requests to circuits
//! - Report circuit state and lock queues of open circuits
//! - Record outcomes through the statistics engine
//! - Lock and unlock queues on the queueing service
//! - Manual close / reopen and inspection for operators
//!
//! # Design Decisions
//! - The store is the only state; the coordinator can be cloned freely via `Arc`
//! - Queue locking on the data path is best effort and only logged
//! - Every store and queue service call carries a deadline

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use futures_util::future::join_all;

use crate::circuit::error::{BreakerResult, CircuitBreakerError};
use crate::circuit::state::{CircuitInfo, CircuitState, QueueResponseType, UpdateStatisticsResult};
use crate::circuit::statistics::{unix_millis, StatisticsEngine};
use crate::circuit::store::CircuitStore;
use crate::config::resource::ConfigurationResource;
use crate::observability::metrics;
use crate::queue::{QueueService, QueueServiceError, LOCK_OWNER};
use crate::resilience::timeouts::with_timeout;
use crate::routing::{PatternAndCircuitHash, RulePatternToCircuitMapping};

const UNIQUE_ID_HEADER: &str = "x-rp-unique_id";
const UNIQUE_ID_HEADER_ALT: &str = "x-rp-unique-id";

/// Default deadline for store and queue service calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// A request taken from a queue, as seen by the breaker.
#[derive(Debug, Clone, Default)]
pub struct QueuedRequest {
    pub uri: String,
    pub headers: HeaderMap,
}

impl QueuedRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// Identity used to deduplicate samples of the same request.
///
/// Taken from `x-rp-unique_id`, then `x-rp-unique-id`, falling back to the URI.
pub fn request_unique_id(request: &QueuedRequest) -> String {
    let header = [UNIQUE_ID_HEADER, UNIQUE_ID_HEADER_ALT]
        .iter()
        .find_map(|name| request.headers.get(*name))
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());

    match header {
        Some(id) => id.to_string(),
        None => {
            tracing::warn!(
                uri = %request.uri,
                "No unique request id header found, falling back to the request uri"
            );
            request.uri.clone()
        }
    }
}

/// Coordinates circuit state, statistics and queue locks for one instance.
pub struct QueueCircuitBreaker {
    store: Arc<dyn CircuitStore>,
    queue_service: Arc<dyn QueueService>,
    mapping: Arc<RulePatternToCircuitMapping>,
    config: Arc<ConfigurationResource>,
    statistics: StatisticsEngine,
    lock_owner: String,
    store_timeout: Duration,
    queue_timeout: Duration,
}

impl QueueCircuitBreaker {
    pub fn new(
        store: Arc<dyn CircuitStore>,
        queue_service: Arc<dyn QueueService>,
        mapping: Arc<RulePatternToCircuitMapping>,
        config: Arc<ConfigurationResource>,
    ) -> Self {
        let statistics = StatisticsEngine::new(store.clone(), config.clone(), DEFAULT_CALL_TIMEOUT);
        Self {
            store,
            queue_service,
            mapping,
            config,
            statistics,
            lock_owner: LOCK_OWNER.to_string(),
            store_timeout: DEFAULT_CALL_TIMEOUT,
            queue_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_lock_owner(mut self, owner: impl Into<String>) -> Self {
        self.lock_owner = owner.into();
        self
    }

    pub fn with_timeouts(mut self, store: Duration, queue: Duration) -> Self {
        self.store_timeout = store;
        self.queue_timeout = queue;
        self.statistics = StatisticsEngine::new(self.store.clone(), self.config.clone(), store);
        self
    }

    pub fn mapping(&self) -> &Arc<RulePatternToCircuitMapping> {
        &self.mapping
    }

    pub fn config(&self) -> &Arc<ConfigurationResource> {
        &self.config
    }

    pub fn is_circuit_check_enabled(&self) -> bool {
        self.config.is_circuit_check_enabled()
    }

    pub fn is_statistics_update_enabled(&self) -> bool {
        self.config.is_statistics_update_enabled()
    }

    fn resolve(&self, queue: Option<&str>, request: &QueuedRequest) -> BreakerResult<PatternAndCircuitHash> {
        self.mapping
            .resolve(&request.uri)
            .ok_or_else(|| CircuitBreakerError::NoMapping {
                queue: queue.map(str::to_string),
                uri: request.uri.clone(),
            })
    }

    /// State of the circuit the request belongs to. If the circuit is open,
    /// `queue` is locked before returning.
    pub async fn handle_queued_request(
        &self,
        queue: &str,
        request: &QueuedRequest,
    ) -> BreakerResult<CircuitState> {
        let circuit = self.resolve(Some(queue), request)?;
        let state = with_timeout("get_state", self.store_timeout, self.store.get_state(&circuit)).await?;

        if state == CircuitState::Open {
            self.lock_queue_logged(queue, request).await;
        }
        Ok(state)
    }

    /// Record the outcome of a queued request. Locks `queue` if this
    /// outcome opened the circuit.
    pub async fn update_statistics(
        &self,
        queue: &str,
        request: &QueuedRequest,
        outcome: QueueResponseType,
    ) -> BreakerResult<UpdateStatisticsResult> {
        let circuit = self.resolve(Some(queue), request)?;
        let request_id = request_unique_id(request);

        let result = self
            .statistics
            .record_outcome(&circuit, &request_id, unix_millis(), outcome)
            .await?;

        match result {
            UpdateStatisticsResult::Opened => {
                tracing::warn!(circuit = %circuit.pattern(), "Circuit has been opened");
                self.lock_queue_logged(queue, request).await;
            }
            UpdateStatisticsResult::Closed => {
                tracing::info!(circuit = %circuit.pattern(), "Circuit has been closed by a successful probe");
            }
            UpdateStatisticsResult::Unchanged => {}
        }
        Ok(result)
    }

    pub async fn close_circuit(&self, request: &QueuedRequest) -> BreakerResult<()> {
        let circuit = self.resolve(None, request)?;
        tracing::info!(circuit = %circuit.pattern(), "About to close circuit");
        with_timeout("close_circuit", self.store_timeout, self.store.close_circuit(&circuit)).await?;
        metrics::record_state_change(CircuitState::Closed);
        tracing::debug!(circuit = %circuit.pattern(), "Circuit has been closed");
        Ok(())
    }

    pub async fn reopen_circuit(&self, request: &QueuedRequest) -> BreakerResult<()> {
        let circuit = self.resolve(None, request)?;
        tracing::info!(circuit = %circuit.pattern(), "About to reopen circuit");
        with_timeout("reopen_circuit", self.store_timeout, self.store.reopen_circuit(&circuit)).await?;
        metrics::record_state_change(CircuitState::Open);
        tracing::info!(circuit = %circuit.pattern(), "Circuit has been reopened");
        Ok(())
    }

    pub async fn close_all_circuits(&self) -> BreakerResult<()> {
        tracing::info!("About to close all circuits");
        with_timeout("close_all_circuits", self.store_timeout, self.store.close_all_circuits()).await
    }

    /// Close a circuit whose rule disappeared and drop all its records.
    pub async fn close_and_remove_circuit(&self, circuit: &PatternAndCircuitHash) -> BreakerResult<()> {
        tracing::info!(circuit = %circuit.pattern(), "Circuit has been removed, closing it");
        with_timeout(
            "close_and_remove_circuit",
            self.store_timeout,
            self.store.close_and_remove_circuit(circuit),
        )
        .await
    }

    /// Record `queue` as locked for the request's circuit and lock it on
    /// the queueing service. The record is removed again if the lock fails.
    pub async fn lock_queue(&self, queue: &str, request: &QueuedRequest) -> BreakerResult<()> {
        let circuit = self.resolve(Some(queue), request)?;
        with_timeout("lock_queue", self.store_timeout, self.store.lock_queue(queue, &circuit)).await?;

        let reply = with_timeout("put_lock", self.queue_timeout, async {
            self.queue_service
                .put_lock(queue, &self.lock_owner)
                .await
                .map_err(|e| queue_error(queue, e))
        })
        .await;

        let result = match reply {
            Ok(status) if status.is_ok() => {
                tracing::info!(
                    queue,
                    circuit = %circuit.pattern(),
                    "Locked queue because the circuit is open"
                );
                Ok(())
            }
            Ok(status) => Err(CircuitBreakerError::QueueService {
                queue: queue.to_string(),
                reason: format!(
                    "got status '{}', queue should have been locked because the circuit '{}' is open",
                    status,
                    circuit.pattern()
                ),
            }),
            Err(e) => Err(e),
        };
        metrics::record_queue_lock(result.is_ok());

        if result.is_err() {
            let rollback = with_timeout(
                "remove_locked_queue",
                self.store_timeout,
                self.store.remove_locked_queue(queue, &circuit),
            )
            .await;
            if let Err(e) = rollback {
                tracing::error!(
                    queue,
                    circuit = %circuit.pattern(),
                    error = %e,
                    "Queue could not be locked and its lock record could not be removed"
                );
            }
        }
        result
    }

    async fn lock_queue_logged(&self, queue: &str, request: &QueuedRequest) {
        if let Err(e) = self.lock_queue(queue, request).await {
            tracing::warn!(queue, error = %e, "Failed to lock queue");
        }
    }

    /// Remove the lock from `queue` on the queueing service.
    ///
    /// On failure the error carries the queue name.
    pub async fn unlock_queue(&self, queue: &str) -> BreakerResult<String> {
        tracing::info!(queue, "About to unlock queue");
        let reply = with_timeout("delete_lock", self.queue_timeout, async {
            self.queue_service
                .delete_lock(queue)
                .await
                .map_err(|e| queue_error(queue, e))
        })
        .await;

        let failure = match reply {
            Ok(status) if status.is_ok() => None,
            Ok(status) => Some(format!("got reply with status '{}'", status)),
            Err(e) => Some(e.to_string()),
        };
        metrics::record_queue_unlock(failure.is_none());

        match failure {
            None => Ok(queue.to_string()),
            Some(reason) => {
                tracing::error!(
                    queue,
                    reason = %reason,
                    "Error during unlock of queue. The queue has been removed from the breaker \
                     bookkeeping but may still be locked on the queueing service. \
                     It must be unlocked manually!"
                );
                Err(CircuitBreakerError::UnlockFailed(queue.to_string()))
            }
        }
    }

    /// Unlock the next queue from the pending-unlock list, if any.
    pub async fn unlock_next_queue(&self) -> BreakerResult<Option<String>> {
        tracing::debug!("About to unlock the next queue");
        let next = with_timeout(
            "pop_queue_to_unlock",
            self.store_timeout,
            self.store.pop_queue_to_unlock(),
        )
        .await?;

        match next {
            Some(queue) => self.unlock_queue(&queue).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn set_open_circuits_to_half_open(&self) -> BreakerResult<u64> {
        self.statistics.sweep_open_to_half_open().await
    }

    /// Unlock one locked queue of every half-open circuit.
    ///
    /// All unlocks are attempted; failures are reported together.
    pub async fn unlock_sample_queues(&self) -> BreakerResult<u64> {
        tracing::debug!("About to unlock a sample queue for each circuit");
        let queues = with_timeout(
            "unlock_sample_queues",
            self.store_timeout,
            self.store.unlock_sample_queues(),
        )
        .await?;
        if queues.is_empty() {
            return Ok(0);
        }

        let results = join_all(queues.iter().map(|queue| {
            tracing::info!(queue = %queue, "About to unlock sample queue");
            self.unlock_queue(queue)
        }))
        .await;

        let failed: Vec<String> = results
            .into_iter()
            .filter_map(|r| match r {
                Ok(_) => None,
                Err(CircuitBreakerError::UnlockFailed(queue)) => Some(queue),
                Err(other) => Some(other.to_string()),
            })
            .collect();

        if failed.is_empty() {
            Ok(queues.len() as u64)
        } else {
            Err(CircuitBreakerError::SampleQueueUnlock(failed))
        }
    }

    pub async fn circuit_info(&self, hash: &str) -> BreakerResult<Option<CircuitInfo>> {
        with_timeout("circuit_info", self.store_timeout, self.store.circuit_info(hash)).await
    }

    pub async fn all_circuits(&self) -> BreakerResult<Vec<CircuitInfo>> {
        with_timeout("all_circuits", self.store_timeout, self.store.all_circuits()).await
    }

    /// Resolve a uri without touching the store. Used by operators to find
    /// the circuit a uri belongs to.
    pub fn circuit_for_uri(&self, uri: &str) -> Option<PatternAndCircuitHash> {
        self.mapping.resolve(uri)
    }
}

fn queue_error(queue: &str, e: QueueServiceError) -> CircuitBreakerError {
    CircuitBreakerError::QueueService {
        queue: queue.to_string(),
        reason: e.to_string(),
    }
}

impl std::fmt::Debug for QueueCircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueCircuitBreaker")
            .field("circuits", &self.mapping.len())
            .field("lock_owner", &self.lock_owner)
            .finish()
    }
}
