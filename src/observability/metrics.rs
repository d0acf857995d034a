//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_breaker_state_changes_total{to}` (counter): transitions by target state
//! - `circuit_breaker_statistics_updates_total{result}` (counter): opened/closed/unchanged
//! - `circuit_breaker_queue_locks_total{result}` (counter): ok/error
//! - `circuit_breaker_queue_unlocks_total{result}` (counter): ok/error
//! - `circuit_breaker_task_runs_total{task,result}` (counter): ran/skipped/failed
//!
//! # Design Decisions
//! - Updates are no-ops until a recorder is installed
//! - Labels are static strings; circuit hashes are never used as labels

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::circuit::state::{CircuitState, UpdateStatisticsResult};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_state_change(to: CircuitState) {
    record_state_changes(to, 1);
}

/// Count `count` circuits moving to `to` at once.
pub fn record_state_changes(to: CircuitState, count: u64) {
    if count > 0 {
        metrics::counter!("circuit_breaker_state_changes_total", "to" => to.as_str())
            .increment(count);
    }
}

pub fn record_statistics_update(result: UpdateStatisticsResult) {
    metrics::counter!(
        "circuit_breaker_statistics_updates_total",
        "result" => result.as_str()
    )
    .increment(1);
}

pub fn record_queue_lock(ok: bool) {
    metrics::counter!("circuit_breaker_queue_locks_total", "result" => outcome(ok)).increment(1);
}

pub fn record_queue_unlock(ok: bool) {
    metrics::counter!("circuit_breaker_queue_unlocks_total", "result" => outcome(ok)).increment(1);
}

pub fn record_task_run(task: &'static str, result: &'static str) {
    metrics::counter!("circuit_breaker_task_runs_total", "task" => task, "result" => result)
        .increment(1);
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}
