//! Keeps circuits in line with the current rule set.
//!
//! When a rule disappears its circuit is closed and all its records are
//! dropped; locked queues of that circuit move to the pending-unlock list so
//! the unlock task releases them eventually.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::breaker::coordinator::QueueCircuitBreaker;
use crate::lifecycle::shutdown::wait_for;
use crate::routing::Rule;

pub struct RuleChangeReconciler {
    breaker: Arc<QueueCircuitBreaker>,
}

impl RuleChangeReconciler {
    pub fn new(breaker: Arc<QueueCircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// Apply a new rule list. Returns how many circuits were removed.
    ///
    /// Failures to close a removed circuit are logged and not retried.
    pub async fn rules_changed(&self, rules: &[Rule]) -> usize {
        tracing::info!(rules = rules.len(), "Rules have changed, renewing rule to circuit mapping");
        let removed = self.breaker.mapping().update(rules);
        tracing::info!(removed = removed.len(), "Mappings removed with the update");

        for circuit in &removed {
            if let Err(e) = self.breaker.close_and_remove_circuit(circuit).await {
                tracing::error!(circuit = %circuit.pattern(), error = %e, "Failed to close circuit");
            }
        }
        removed.len()
    }

    /// Apply the current rules, then every pushed rule set until shutdown.
    pub async fn run(
        self,
        mut rules_rx: watch::Receiver<Arc<Vec<Rule>>>,
        shutdown_rx: broadcast::Receiver<()>,
    ) {
        let initial = rules_rx.borrow_and_update().clone();
        self.rules_changed(&initial).await;

        let shutdown = wait_for(shutdown_rx);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                changed = rules_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let rules = rules_rx.borrow_and_update().clone();
                    self.rules_changed(&rules).await;
                }
                _ = &mut shutdown => break,
            }
        }
        tracing::info!("Rule reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::breaker::coordinator::QueuedRequest;
    use crate::circuit::memory::InMemoryCircuitStore;
    use crate::circuit::state::{CircuitState, QueueResponseType};
    use crate::config::resource::ConfigurationResource;
    use crate::config::schema::CircuitBreakerConfig;
    use crate::lifecycle::Shutdown;
    use crate::queue::{QueueService, QueueServiceError, ReplyStatus};
    use crate::routing::{RulePatternToCircuitMapping, RuleProvider};

    struct AlwaysOk;

    #[async_trait]
    impl QueueService for AlwaysOk {
        async fn put_lock(&self, _queue: &str, _owner: &str) -> Result<ReplyStatus, QueueServiceError> {
            Ok(ReplyStatus::Ok)
        }

        async fn delete_lock(&self, _queue: &str) -> Result<ReplyStatus, QueueServiceError> {
            Ok(ReplyStatus::Ok)
        }
    }

    fn setup() -> (Arc<QueueCircuitBreaker>, Arc<InMemoryCircuitStore>) {
        let store = Arc::new(InMemoryCircuitStore::new());
        let config = CircuitBreakerConfig {
            min_queue_sample_count: 1,
            ..CircuitBreakerConfig::default()
        };
        let breaker = Arc::new(QueueCircuitBreaker::new(
            store.clone(),
            Arc::new(AlwaysOk),
            Arc::new(RulePatternToCircuitMapping::new()),
            Arc::new(ConfigurationResource::new(config)),
        ));
        (breaker, store)
    }

    fn rules(patterns: &[&str]) -> Vec<Rule> {
        patterns.iter().map(|p| Rule::new(*p).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_removed_rule_closes_and_removes_circuit() {
        let (breaker, store) = setup();
        let reconciler = RuleChangeReconciler::new(breaker.clone());
        assert_eq!(reconciler.rules_changed(&rules(&["/a/.*", "/b/.*"])).await, 0);

        let req = QueuedRequest::new("/a/1");
        breaker
            .update_statistics("queue-a", &req, QueueResponseType::Failure)
            .await
            .unwrap();
        assert_eq!(breaker.handle_queued_request("queue-a", &req).await.unwrap(), CircuitState::Open);

        assert_eq!(reconciler.rules_changed(&rules(&["/b/.*"])).await, 1);

        assert!(breaker.all_circuits().await.unwrap().is_empty());
        assert_eq!(store.pending_unlock_count(), 1);
        let err = breaker.handle_queued_request("queue-a", &req).await.unwrap_err();
        assert!(err.is_no_mapping());
    }

    #[tokio::test]
    async fn test_run_follows_rule_provider() {
        let (breaker, _) = setup();
        let provider = RuleProvider::new(rules(&["/a/.*"]));
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(
            RuleChangeReconciler::new(breaker.clone()).run(provider.subscribe(), shutdown.subscribe()),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.circuit_for_uri("/a/1").is_some());

        provider.publish(rules(&["/c/.*"]));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.circuit_for_uri("/a/1").is_none());
        assert!(breaker.circuit_for_uri("/c/1").is_some());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
