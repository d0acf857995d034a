//! Live circuit breaker configuration.
//!
//! Readers pull the current snapshot without locking; the scheduler
//! subscribes to refresh notifications and re-registers its tasks.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::config::schema::CircuitBreakerConfig;

/// Holds the current [`CircuitBreakerConfig`] and announces replacements.
#[derive(Debug)]
pub struct ConfigurationResource {
    current: ArcSwap<CircuitBreakerConfig>,
    /// Bumped on every accepted update.
    refresh_tx: watch::Sender<u64>,
}

impl ConfigurationResource {
    pub fn new(initial: CircuitBreakerConfig) -> Self {
        let (refresh_tx, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(initial),
            refresh_tx,
        }
    }

    /// The configuration snapshot in effect right now.
    pub fn current(&self) -> Arc<CircuitBreakerConfig> {
        self.current.load_full()
    }

    /// Replace the configuration. Observers are notified only if it changed.
    pub fn update(&self, config: CircuitBreakerConfig) -> bool {
        if *self.current.load_full() == config {
            return false;
        }
        self.current.store(Arc::new(config));
        self.refresh_tx.send_modify(|generation| *generation += 1);
        tracing::info!("Circuit breaker configuration values have changed");
        true
    }

    /// Subscribe to refresh notifications.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.refresh_tx.subscribe()
    }

    pub fn is_circuit_check_enabled(&self) -> bool {
        self.current.load().circuit_check_enabled
    }

    pub fn is_statistics_update_enabled(&self) -> bool {
        self.current.load().statistics_update_enabled
    }
}

impl Default for ConfigurationResource {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_notifies_subscribers() {
        let resource = ConfigurationResource::default();
        let mut rx = resource.subscribe();
        assert!(!resource.is_circuit_check_enabled());

        let mut next = CircuitBreakerConfig::default();
        next.circuit_check_enabled = true;
        assert!(resource.update(next.clone()));

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert!(resource.is_circuit_check_enabled());

        // Same values again: no refresh.
        assert!(!resource.update(next));
        assert!(!rx.has_changed().unwrap());
    }
}
