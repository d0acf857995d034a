//! Queue circuit breaker service.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌───────────────────────────────────────────────────────┐
//!                 │                 QUEUE CIRCUIT BREAKER                 │
//!                 │                                                       │
//!  queued request │  ┌──────────┐   ┌─────────────┐   ┌───────────────┐   │
//!  ───────────────┼─▶│ routing  │──▶│ coordinator │──▶│ circuit store │   │
//!  + outcome      │  │ mapping  │   │             │   │ (shared)      │   │
//!                 │  └──────────┘   └──────┬──────┘   └───────────────┘   │
//!                 │                        │ lock / unlock                │
//!                 │                        ▼                              │
//!                 │                 ┌─────────────┐                       │
//!                 │                 │queue service│───────────────────────┼──▶ queueing
//!                 │                 └─────────────┘                       │    service
//!                 │                                                       │
//!                 │  ┌──────────────────┐  ┌────────────────────────────┐ │
//!                 │  │ scheduler + lock │  │ reconciler (rule changes)  │ │
//!                 │  └──────────────────┘  └────────────────────────────┘ │
//!                 │  ┌────────┐ ┌───────────────┐ ┌──────────┐ ┌───────┐  │
//!                 │  │ config │ │ observability │ │lifecycle │ │ admin │  │
//!                 │  └────────┘ └───────────────┘ └──────────┘ └───────┘  │
//!                 └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Deployment
//!
//! This binary wires [`InMemoryCircuitStore`] and [`InMemoryLock`], so circuit
//! state and the maintenance locks live in this process only. Running several
//! gateway instances against one queueing service needs a shared
//! implementation of `CircuitStore` and `DistributedLock` in place of these.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use uuid::Uuid;

use queue_circuit_breaker::admin::{self, AdminState};
use queue_circuit_breaker::breaker::{MaintenanceScheduler, QueueCircuitBreaker, RuleChangeReconciler};
use queue_circuit_breaker::circuit::{CircuitStore, InMemoryCircuitStore};
use queue_circuit_breaker::config::loader::load_config;
use queue_circuit_breaker::config::watcher::ConfigWatcher;
use queue_circuit_breaker::config::{ConfigurationResource, GatewayConfig};
use queue_circuit_breaker::lifecycle::{signals, DeferClose, Shutdown};
use queue_circuit_breaker::lock::{InMemoryLock, LockGate};
use queue_circuit_breaker::observability::{logging, metrics};
use queue_circuit_breaker::queue::HttpQueueService;
use queue_circuit_breaker::routing::{Rule, RulePatternToCircuitMapping, RuleProvider};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "queue-circuit-breaker")]
#[command(about = "Distributed circuit breaker for queued HTTP requests", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "queue-circuit-breaker starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let instance_id = format!("{}-{}", config.instance.name, Uuid::new_v4().simple());
    let store_timeout = Duration::from_millis(config.store.timeout_ms);
    let queue_timeout = Duration::from_millis(config.queue_service.timeout_ms);

    tracing::info!(
        instance = %instance_id,
        rules = config.rules.len(),
        queue_service = %config.queue_service.base_url,
        "Configuration loaded"
    );

    let resource = Arc::new(ConfigurationResource::new(config.circuit_breaker.clone()));
    let store: Arc<dyn CircuitStore> = Arc::new(InMemoryCircuitStore::new());
    let queue_client = Arc::new(DeferClose::new(HttpQueueService::from_config(&config.queue_service)?));
    let mapping = Arc::new(RulePatternToCircuitMapping::new());

    let breaker = Arc::new(
        QueueCircuitBreaker::new(store, queue_client.clone(), mapping, resource.clone())
            .with_lock_owner(config.queue_service.lock_owner.clone())
            .with_timeouts(store_timeout, queue_timeout),
    );

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let provider = Arc::new(RuleProvider::new(Rule::compile_all(&config.rules)?));
    tasks.push(tokio::spawn(
        RuleChangeReconciler::new(breaker.clone()).run(provider.subscribe(), shutdown.subscribe()),
    ));

    let gate = LockGate::new(Arc::new(InMemoryLock::new()), instance_id.as_str(), store_timeout);
    let scheduler = Arc::new(MaintenanceScheduler::new(breaker.clone(), gate));
    tasks.push(tokio::spawn(scheduler.clone().run(shutdown.subscribe())));

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(breaker.clone(), &instance_id, config.admin.api_key.as_deref());
        let admin_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    let (watcher, mut updates) = ConfigWatcher::new(&args.config);
    let _watch_guard = match watcher.run() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!(error = %e, "Config file watching disabled, reload with SIGHUP only");
            None
        }
    };

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();
    {
        let resource = resource.clone();
        let provider = provider.clone();
        let mut reload_shutdown = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(next) = updates.recv() => apply_config(&resource, &provider, next),
                    Some(()) = reload_rx.recv() => {
                        watcher.reload();
                    }
                    _ = reload_shutdown.recv() => break,
                }
            }
        }));
    }

    signals::wait_for_shutdown(reload_tx).await?;
    shutdown.trigger();

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, futures_util::future::join_all(tasks)).await;
    if drained.is_err() {
        tracing::warn!("Background tasks did not stop in time");
    }

    queue_client.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, queue_client.closed()).await.is_err() {
        tracing::warn!(in_flight = queue_client.in_flight(), "Queue service calls still in flight");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Push a reloaded configuration into the running components.
fn apply_config(resource: &ConfigurationResource, provider: &RuleProvider, config: GatewayConfig) {
    resource.update(config.circuit_breaker);

    match Rule::compile_all(&config.rules) {
        Ok(rules) => {
            if provider.publish(rules) {
                tracing::info!(rules = config.rules.len(), "Published new rule set");
            }
        }
        Err(e) => tracing::error!(error = %e, "Rejected rule set from reloaded configuration"),
    }
}
