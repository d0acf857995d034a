//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (percentages, sample counts, intervals)
//! - Check rule patterns compile and are unique
//! - Check addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{CircuitBreakerConfig, GatewayConfig, TaskConfig};
use crate::routing::Rule;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },

    #[error("min_queue_sample_count ({min}) must not exceed max_queue_sample_count ({max})")]
    SampleBounds { min: usize, max: usize },

    #[error("{task} is enabled but has interval_ms = 0")]
    ZeroInterval { task: &'static str },

    #[error("invalid address for {field}: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid url_pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("duplicate url_pattern '{0}'")]
    DuplicatePattern(String),

    #[error("invalid queue_service.base_url '{0}'")]
    InvalidUrl(String),
}

/// Validate a full configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = validate_breaker_config(&config.circuit_breaker);

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if url::Url::parse(&config.queue_service.base_url).is_err() {
        errors.push(ValidationError::InvalidUrl(config.queue_service.base_url.clone()));
    }
    check_range(&mut errors, "queue_service.timeout_ms", config.queue_service.timeout_ms, 1, 600_000);
    check_range(&mut errors, "store.timeout_ms", config.store.timeout_ms, 1, 600_000);

    let mut patterns = HashSet::new();
    for rule in &config.rules {
        if let Err(e) = Rule::from_config(rule) {
            errors.push(ValidationError::InvalidPattern {
                pattern: rule.url_pattern.clone(),
                reason: e.to_string(),
            });
        }
        if !patterns.insert(rule.url_pattern.as_str()) {
            errors.push(ValidationError::DuplicatePattern(rule.url_pattern.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the hot-reloadable breaker section on its own.
pub fn validate_breaker_config(config: &CircuitBreakerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_range(
        &mut errors,
        "circuit_breaker.error_threshold_percentage",
        config.error_threshold_percentage as u64,
        0,
        100,
    );
    check_range(
        &mut errors,
        "circuit_breaker.entries_max_age_ms",
        config.entries_max_age_ms,
        1,
        u64::MAX,
    );
    check_range(
        &mut errors,
        "circuit_breaker.max_queue_sample_count",
        config.max_queue_sample_count as u64,
        1,
        u64::MAX,
    );
    if config.min_queue_sample_count > config.max_queue_sample_count {
        errors.push(ValidationError::SampleBounds {
            min: config.min_queue_sample_count,
            max: config.max_queue_sample_count,
        });
    }

    check_task(&mut errors, "circuit_breaker.open_to_half_open", &config.open_to_half_open);
    check_task(&mut errors, "circuit_breaker.unlock_queues", &config.unlock_queues);
    check_task(
        &mut errors,
        "circuit_breaker.unlock_sample_queues",
        &config.unlock_sample_queues,
    );

    errors
}

fn check_range(errors: &mut Vec<ValidationError>, field: &'static str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(ValidationError::OutOfRange { field, min, max, value });
    }
}

fn check_task(errors: &mut Vec<ValidationError>, task: &'static str, config: &TaskConfig) {
    if config.enabled && config.interval_ms == 0 {
        errors.push(ValidationError::ZeroInterval { task });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RuleConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.error_threshold_percentage = 150;
        config.circuit_breaker.min_queue_sample_count = 10;
        config.circuit_breaker.max_queue_sample_count = 5;
        config.circuit_breaker.unlock_queues = TaskConfig::every(0);
        config.admin.bind_address = "not-an-address".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::SampleBounds { min: 10, max: 5 }));
        assert!(errors.contains(&ValidationError::ZeroInterval {
            task: "circuit_breaker.unlock_queues"
        }));
    }

    #[test]
    fn test_disabled_task_may_have_zero_interval() {
        let mut config = CircuitBreakerConfig::default();
        config.open_to_half_open = TaskConfig::disabled(0);
        assert!(validate_breaker_config(&config).is_empty());
    }

    #[test]
    fn test_rejects_bad_and_duplicate_patterns() {
        let mut config = GatewayConfig::default();
        config.rules = vec![
            RuleConfig { name: None, url_pattern: "/a/.*".into() },
            RuleConfig { name: None, url_pattern: "/a/.*".into() },
            RuleConfig { name: None, url_pattern: "/b/[".into() },
        ];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ValidationError::DuplicatePattern("/a/.*".into())));
        assert!(matches!(errors[1], ValidationError::InvalidPattern { .. }));
    }
}
