//! Storage contract for circuit state shared by all gateway instances.

use async_trait::async_trait;

use crate::circuit::error::BreakerResult;
use crate::circuit::state::{CircuitInfo, CircuitState, UpdateStatisticsResult};
use crate::circuit::statistics::{Sample, Thresholds};
use crate::routing::PatternAndCircuitHash;

/// Durable per-circuit state, sample log and locked-queue bookkeeping.
///
/// Every operation must be atomic with respect to a single circuit, since
/// several gateway instances call into the same store concurrently.
#[async_trait]
pub trait CircuitStore: Send + Sync {
    /// Current state of the circuit; unknown circuits are `Closed`.
    async fn get_state(&self, circuit: &PatternAndCircuitHash) -> BreakerResult<CircuitState>;

    /// Inspection snapshot of one circuit, by hash.
    async fn circuit_info(&self, hash: &str) -> BreakerResult<Option<CircuitInfo>>;

    /// Inspection snapshots of all known circuits.
    async fn all_circuits(&self) -> BreakerResult<Vec<CircuitInfo>>;

    /// Append a sample, prune the window and apply the resulting transition.
    async fn record_sample(
        &self,
        circuit: &PatternAndCircuitHash,
        sample: Sample,
        thresholds: Thresholds,
    ) -> BreakerResult<UpdateStatisticsResult>;

    /// Close the circuit, reset its statistics and schedule its locked
    /// queues for unlocking.
    async fn close_circuit(&self, circuit: &PatternAndCircuitHash) -> BreakerResult<()>;

    /// Force the circuit to `Open`.
    async fn reopen_circuit(&self, circuit: &PatternAndCircuitHash) -> BreakerResult<()>;

    /// Close the circuit and forget everything about it. Its locked queues
    /// are scheduled for unlocking.
    async fn close_and_remove_circuit(&self, circuit: &PatternAndCircuitHash)
        -> BreakerResult<()>;

    /// Close every known circuit.
    async fn close_all_circuits(&self) -> BreakerResult<()>;

    /// Move all open circuits to half-open. Returns the number changed.
    async fn set_open_circuits_to_half_open(&self) -> BreakerResult<u64>;

    /// Remember that `queue` is locked on behalf of `circuit`.
    async fn lock_queue(&self, queue: &str, circuit: &PatternAndCircuitHash) -> BreakerResult<()>;

    /// Forget that `queue` is locked on behalf of `circuit`. Used when the
    /// queueing service refused the lock.
    async fn remove_locked_queue(&self, queue: &str, circuit: &PatternAndCircuitHash)
        -> BreakerResult<()>;

    /// Take one queue from the pending-unlock list.
    async fn pop_queue_to_unlock(&self) -> BreakerResult<Option<String>>;

    /// Pick one locked queue per half-open circuit to be released as a probe.
    async fn unlock_sample_queues(&self) -> BreakerResult<Vec<String>>;
}
