//! Sliding-window statistics and the open/close decision.
//!
//! # Window
//! ```text
//! samples ordered by timestamp, deduplicated by request id
//!     → drop samples older than entries_max_age_ms (relative to the recorded sample)
//!     → drop oldest samples beyond max_queue_sample_count
//!     → failure% = failures / total * 100 once total >= min_queue_sample_count
//! ```
//!
//! # Transitions
//! ```text
//! Closed   → Open:   live count >= min and failure% >= threshold
//! HalfOpen → Open:   any failure
//! HalfOpen → Closed: any success (window restarts with that success)
//! Open:              samples recorded, no transition
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::circuit::error::BreakerResult;
use crate::circuit::state::{CircuitState, QueueResponseType, UpdateStatisticsResult};
use crate::circuit::store::CircuitStore;
use crate::config::resource::ConfigurationResource;
use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::routing::PatternAndCircuitHash;

/// One recorded outcome of a queued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub request_id: String,
    pub timestamp_ms: u64,
    pub outcome: QueueResponseType,
}

impl Sample {
    pub fn new(request_id: impl Into<String>, timestamp_ms: u64, outcome: QueueResponseType) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp_ms,
            outcome,
        }
    }
}

/// Bounds and threshold applied when a sample is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub error_threshold_percentage: u32,
    pub entries_max_age_ms: u64,
    pub min_queue_sample_count: usize,
    pub max_queue_sample_count: usize,
}

impl From<&CircuitBreakerConfig> for Thresholds {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            error_threshold_percentage: config.error_threshold_percentage,
            entries_max_age_ms: config.entries_max_age_ms,
            min_queue_sample_count: config.min_queue_sample_count,
            max_queue_sample_count: config.max_queue_sample_count,
        }
    }
}

/// Time-ordered, deduplicated sample log of one circuit.
#[derive(Debug, Clone, Default)]
pub struct SampleWindow {
    samples: VecDeque<Sample>,
    ids: HashSet<String>,
    failures: usize,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample and prune the window. The sample's timestamp is the
    /// current time of the recording instance and anchors the age cutoff.
    ///
    /// Returns `false` if a sample with the same request id is already live;
    /// the window is left untouched in that case.
    pub fn record(&mut self, sample: Sample, thresholds: &Thresholds) -> bool {
        if self.ids.contains(&sample.request_id) {
            return false;
        }

        let now_ms = sample.timestamp_ms;

        // Outcomes of concurrent requests can arrive out of order.
        let pos = self
            .samples
            .partition_point(|s| s.timestamp_ms <= sample.timestamp_ms);
        if sample.outcome.is_failure() {
            self.failures += 1;
        }
        self.ids.insert(sample.request_id.clone());
        self.samples.insert(pos, sample);

        self.prune(now_ms, thresholds);
        true
    }

    /// Drop samples older than the max age and beyond the max count.
    pub fn prune(&mut self, now_ms: u64, thresholds: &Thresholds) {
        let cutoff = now_ms.saturating_sub(thresholds.entries_max_age_ms);
        while self.samples.front().is_some_and(|s| s.timestamp_ms < cutoff) {
            self.pop_oldest();
        }
        while self.samples.len() > thresholds.max_queue_sample_count {
            self.pop_oldest();
        }
    }

    fn pop_oldest(&mut self) {
        if let Some(sample) = self.samples.pop_front() {
            self.ids.remove(&sample.request_id);
            if sample.outcome.is_failure() {
                self.failures -= 1;
            }
        }
    }

    /// Restart the window, keeping only `sample`.
    pub fn reset_with(&mut self, sample: Sample) {
        self.clear();
        if sample.outcome.is_failure() {
            self.failures = 1;
        }
        self.ids.insert(sample.request_id.clone());
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.ids.clear();
        self.failures = 0;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Floored failure percentage of the live window (0 when empty).
    pub fn fail_ratio(&self) -> u32 {
        if self.samples.is_empty() {
            return 0;
        }
        (self.failures * 100 / self.samples.len()) as u32
    }

    /// `true` once the window holds enough samples and the failure
    /// percentage reaches the threshold.
    pub fn exceeds(&self, thresholds: &Thresholds) -> bool {
        let total = self.samples.len();
        if total == 0 || total < thresholds.min_queue_sample_count {
            return false;
        }
        // failures / total * 100 >= threshold, without rounding.
        self.failures * 100 >= thresholds.error_threshold_percentage as usize * total
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Decide the transition caused by a freshly recorded sample.
pub fn decide(
    state: CircuitState,
    outcome: QueueResponseType,
    window: &SampleWindow,
    thresholds: &Thresholds,
) -> UpdateStatisticsResult {
    match state {
        CircuitState::Closed if window.exceeds(thresholds) => UpdateStatisticsResult::Opened,
        CircuitState::Closed => UpdateStatisticsResult::Unchanged,
        CircuitState::HalfOpen if outcome.is_failure() => UpdateStatisticsResult::Opened,
        CircuitState::HalfOpen => UpdateStatisticsResult::Closed,
        CircuitState::Open => UpdateStatisticsResult::Unchanged,
    }
}

/// Records outcomes and runs the open → half-open sweep against the store.
pub struct StatisticsEngine {
    store: Arc<dyn CircuitStore>,
    config: Arc<ConfigurationResource>,
    call_timeout: Duration,
}

impl StatisticsEngine {
    pub fn new(
        store: Arc<dyn CircuitStore>,
        config: Arc<ConfigurationResource>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            config,
            call_timeout,
        }
    }

    /// Append a deduplicated sample and evaluate the circuit.
    ///
    /// Thresholds are taken from the configuration current at call time.
    pub async fn record_outcome(
        &self,
        circuit: &PatternAndCircuitHash,
        request_id: &str,
        timestamp_ms: u64,
        outcome: QueueResponseType,
    ) -> BreakerResult<UpdateStatisticsResult> {
        let thresholds = Thresholds::from(self.config.current().as_ref());
        let sample = Sample::new(request_id, timestamp_ms, outcome);

        let result = with_timeout(
            "record_sample",
            self.call_timeout,
            self.store.record_sample(circuit, sample, thresholds),
        )
        .await?;

        metrics::record_statistics_update(result);
        match result {
            UpdateStatisticsResult::Opened => metrics::record_state_change(CircuitState::Open),
            UpdateStatisticsResult::Closed => metrics::record_state_change(CircuitState::Closed),
            UpdateStatisticsResult::Unchanged => {}
        }
        Ok(result)
    }

    /// Move every open circuit to half-open. Statistics are kept.
    pub async fn sweep_open_to_half_open(&self) -> BreakerResult<u64> {
        let changed = with_timeout(
            "set_open_circuits_to_half_open",
            self.call_timeout,
            self.store.set_open_circuits_to_half_open(),
        )
        .await?;
        metrics::record_state_changes(CircuitState::HalfOpen, changed);
        Ok(changed)
    }
}
