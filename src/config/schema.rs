//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the breaker.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration of a gateway instance's circuit breaker.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity of this gateway instance.
    pub instance: InstanceConfig,

    /// Hot-reloadable circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Queueing service (lock/unlock) endpoint.
    pub queue_service: QueueServiceConfig,

    /// Backing store settings.
    pub store: StoreConfig,

    /// Admin listener settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Routing rules whose patterns define the circuits.
    pub rules: Vec<RuleConfig>,
}

/// Instance identity, used to build lock tokens.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InstanceConfig {
    /// Human-readable instance name; a random suffix is appended at startup.
    pub name: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "gateway".to_string(),
        }
    }
}

/// Circuit breaker configuration, replaced wholesale on reload.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure percentage at or above which a circuit opens.
    pub error_threshold_percentage: u32,

    /// Samples older than this are excluded from the ratio.
    pub entries_max_age_ms: u64,

    /// Minimum live samples before any decision is made.
    pub min_queue_sample_count: usize,

    /// Maximum live samples kept per circuit.
    pub max_queue_sample_count: usize,

    /// Whether queued requests are checked against their circuit.
    pub circuit_check_enabled: bool,

    /// Whether outcomes of queued requests are recorded.
    pub statistics_update_enabled: bool,

    /// Open → half-open sweep.
    pub open_to_half_open: TaskConfig,

    /// Release of queues pending unlock, one per tick.
    pub unlock_queues: TaskConfig,

    /// Release of one probe queue per half-open circuit.
    pub unlock_sample_queues: TaskConfig,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 90,
            entries_max_age_ms: 86_400_000, // 24h
            min_queue_sample_count: 100,
            max_queue_sample_count: 5000,
            circuit_check_enabled: false,
            statistics_update_enabled: false,
            open_to_half_open: TaskConfig::disabled(120_000),
            unlock_queues: TaskConfig::disabled(10_000),
            unlock_sample_queues: TaskConfig::disabled(120_000),
        }
    }
}

/// A periodic maintenance task.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct TaskConfig {
    /// Run the task at all.
    #[serde(default)]
    pub enabled: bool,

    /// Tick interval in milliseconds.
    pub interval_ms: u64,
}

impl TaskConfig {
    pub const fn disabled(interval_ms: u64) -> Self {
        Self {
            enabled: false,
            interval_ms,
        }
    }

    pub const fn every(interval_ms: u64) -> Self {
        Self {
            enabled: true,
            interval_ms,
        }
    }
}

/// Queueing service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueueServiceConfig {
    /// Base URL of the queueing service's HTTP API.
    pub base_url: String,

    /// Owner label attached to locks put by the breaker.
    pub lock_owner: String,

    /// Timeout for a single lock/unlock call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for QueueServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7070/queuing/".to_string(),
            lock_owner: "queue_circuit_breaker".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Backing store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Timeout for a single store or lock call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

/// Admin listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// Admin listener bind address.
    pub bind_address: String,

    /// Bearer token required by the admin API. No auth when unset.
    pub api_key: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:7013".to_string(),
            api_key: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// A routing rule; its pattern defines a circuit.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuleConfig {
    /// Rule identifier for logging.
    #[serde(default)]
    pub name: Option<String>,

    /// Regular expression matched against the whole request URI.
    pub url_pattern: String,
}
