//! In-process circuit store.
//!
//! Implements the full [`CircuitStore`] contract with per-circuit atomicity
//! (one `DashMap` entry per circuit). Several coordinators can share one
//! instance through an `Arc`, which is how a single process simulates a
//! cluster and how the standalone binary runs.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::circuit::error::{BreakerResult, CircuitBreakerError};
use crate::circuit::state::{CircuitInfo, CircuitState, UpdateStatisticsResult};
use crate::circuit::statistics::{decide, Sample, SampleWindow, Thresholds};
use crate::circuit::store::CircuitStore;
use crate::routing::PatternAndCircuitHash;

#[derive(Debug)]
struct CircuitEntry {
    pattern: String,
    state: CircuitState,
    window: SampleWindow,
    /// Queues locked for this circuit, longest-waiting first.
    locked_queues: VecDeque<String>,
}

impl CircuitEntry {
    fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            state: CircuitState::Closed,
            window: SampleWindow::new(),
            locked_queues: VecDeque::new(),
        }
    }

    fn info(&self, hash: &str) -> CircuitInfo {
        CircuitInfo {
            hash: hash.to_string(),
            pattern: self.pattern.clone(),
            state: self.state,
            fail_ratio: self.window.fail_ratio(),
            sample_count: self.window.len(),
            locked_queues: self.locked_queues.len(),
        }
    }
}

/// Circuit store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCircuitStore {
    circuits: DashMap<String, CircuitEntry>,
    queues_to_unlock: Mutex<VecDeque<String>>,
}

impl InMemoryCircuitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queues waiting in the pending-unlock list.
    pub fn pending_unlock_count(&self) -> usize {
        self.queues_to_unlock.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn pending(&self) -> BreakerResult<MutexGuard<'_, VecDeque<String>>> {
        self.queues_to_unlock
            .lock()
            .map_err(|_| CircuitBreakerError::Store("pending unlock list poisoned".into()))
    }

    /// Reset the entry to `Closed` and hand its locked queues over to the
    /// pending-unlock list.
    fn close_entry(&self, entry: &mut CircuitEntry) -> BreakerResult<()> {
        entry.state = CircuitState::Closed;
        entry.window.clear();
        self.schedule_unlock(entry.locked_queues.drain(..))
    }

    fn schedule_unlock(&self, queues: impl IntoIterator<Item = String>) -> BreakerResult<()> {
        let mut pending = self.pending()?;
        for queue in queues {
            if !pending.contains(&queue) {
                pending.push_back(queue);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CircuitStore for InMemoryCircuitStore {
    async fn get_state(&self, circuit: &PatternAndCircuitHash) -> BreakerResult<CircuitState> {
        Ok(self
            .circuits
            .get(circuit.hash())
            .map(|entry| entry.state)
            .unwrap_or_default())
    }

    async fn circuit_info(&self, hash: &str) -> BreakerResult<Option<CircuitInfo>> {
        Ok(self.circuits.get(hash).map(|entry| entry.info(hash)))
    }

    async fn all_circuits(&self) -> BreakerResult<Vec<CircuitInfo>> {
        let mut all: Vec<CircuitInfo> = self
            .circuits
            .iter()
            .map(|r| r.value().info(r.key()))
            .collect();
        all.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        Ok(all)
    }

    async fn record_sample(
        &self,
        circuit: &PatternAndCircuitHash,
        sample: Sample,
        thresholds: Thresholds,
    ) -> BreakerResult<UpdateStatisticsResult> {
        let mut entry = self
            .circuits
            .entry(circuit.hash().to_string())
            .or_insert_with(|| CircuitEntry::new(circuit.pattern()));

        let outcome = sample.outcome;
        let probe = (entry.state == CircuitState::HalfOpen).then(|| sample.clone());
        if !entry.window.record(sample, &thresholds) {
            return Ok(UpdateStatisticsResult::Unchanged);
        }

        let result = decide(entry.state, outcome, &entry.window, &thresholds);
        match result {
            UpdateStatisticsResult::Opened => entry.state = CircuitState::Open,
            UpdateStatisticsResult::Closed => {
                self.close_entry(&mut entry)?;
                if let Some(probe) = probe {
                    entry.window.reset_with(probe);
                }
            }
            UpdateStatisticsResult::Unchanged => {}
        }
        Ok(result)
    }

    async fn close_circuit(&self, circuit: &PatternAndCircuitHash) -> BreakerResult<()> {
        match self.circuits.get_mut(circuit.hash()) {
            Some(mut entry) => self.close_entry(&mut entry),
            None => Ok(()),
        }
    }

    async fn reopen_circuit(&self, circuit: &PatternAndCircuitHash) -> BreakerResult<()> {
        self.circuits
            .entry(circuit.hash().to_string())
            .or_insert_with(|| CircuitEntry::new(circuit.pattern()))
            .state = CircuitState::Open;
        Ok(())
    }

    async fn close_and_remove_circuit(
        &self,
        circuit: &PatternAndCircuitHash,
    ) -> BreakerResult<()> {
        match self.circuits.remove(circuit.hash()) {
            Some((_, entry)) => self.schedule_unlock(entry.locked_queues),
            None => Ok(()),
        }
    }

    async fn close_all_circuits(&self) -> BreakerResult<()> {
        for mut entry in self.circuits.iter_mut() {
            self.close_entry(entry.value_mut())?;
        }
        Ok(())
    }

    async fn set_open_circuits_to_half_open(&self) -> BreakerResult<u64> {
        let mut changed = 0;
        for mut entry in self.circuits.iter_mut() {
            if entry.state == CircuitState::Open {
                entry.state = CircuitState::HalfOpen;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn lock_queue(&self, queue: &str, circuit: &PatternAndCircuitHash) -> BreakerResult<()> {
        let mut entry = self
            .circuits
            .entry(circuit.hash().to_string())
            .or_insert_with(|| CircuitEntry::new(circuit.pattern()));
        if !entry.locked_queues.iter().any(|q| q == queue) {
            entry.locked_queues.push_back(queue.to_string());
        }
        // A queue locked again must not be released by a stale unlock record.
        self.pending()?.retain(|q| q != queue);
        Ok(())
    }

    async fn remove_locked_queue(
        &self,
        queue: &str,
        circuit: &PatternAndCircuitHash,
    ) -> BreakerResult<()> {
        if let Some(mut entry) = self.circuits.get_mut(circuit.hash()) {
            entry.locked_queues.retain(|q| q != queue);
        }
        Ok(())
    }

    async fn pop_queue_to_unlock(&self) -> BreakerResult<Option<String>> {
        Ok(self.pending()?.pop_front())
    }

    async fn unlock_sample_queues(&self) -> BreakerResult<Vec<String>> {
        let mut samples = Vec::new();
        for mut entry in self.circuits.iter_mut() {
            if entry.state != CircuitState::HalfOpen {
                continue;
            }
            // Rotate so the next sweep probes a different queue.
            if let Some(queue) = entry.locked_queues.pop_front() {
                entry.locked_queues.push_back(queue.clone());
                samples.push(queue);
            }
        }
        Ok(samples)
    }
}
