//! Circuit state and outcome types shared by the store and the coordinator.

use serde::{Deserialize, Serialize};

/// State of a single circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Traffic flows normally, failures are counted.
    #[default]
    Closed,
    /// Trial state: one probe queue per sweep is released.
    HalfOpen,
    /// Traffic is blocked and queues for the circuit are locked.
    Open,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::HalfOpen => "half_open",
            Self::Open => "open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a queued request as seen by the queue processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueResponseType {
    Success,
    Failure,
}

impl QueueResponseType {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

/// Result of recording a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatisticsResult {
    /// The circuit transitioned to `Open` with this sample.
    Opened,
    /// A half-open circuit received a successful probe and is closed again.
    Closed,
    Unchanged,
}

impl UpdateStatisticsResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Snapshot of a circuit for inspection through the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitInfo {
    /// Circuit identity (hash of the rule pattern).
    pub hash: String,
    /// The rule pattern backing the circuit.
    pub pattern: String,
    pub state: CircuitState,
    /// Failure percentage of the live window (floored).
    pub fail_ratio: u32,
    /// Live samples in the window.
    pub sample_count: usize,
    /// Queues currently locked on behalf of this circuit.
    pub locked_queues: usize,
}
