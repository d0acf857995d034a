//! Distributed queue circuit breaker.
//!
//! Protects downstream targets of queued HTTP requests: outcomes are grouped
//! into circuits by routing rule, a circuit opens when its failure ratio
//! crosses a threshold, and the queues feeding an open circuit are locked on
//! the queueing service until probes show the target has recovered.

pub mod admin;
pub mod breaker;
pub mod circuit;
pub mod config;
pub mod lifecycle;
pub mod lock;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod routing;

pub use breaker::{QueueCircuitBreaker, QueuedRequest};
pub use circuit::{CircuitBreakerError, CircuitState, QueueResponseType};
pub use config::schema::GatewayConfig;
pub use lifecycle::Shutdown;
