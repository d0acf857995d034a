//! Queue circuit breaker.
//!
//! # Data Flow
//! ```text
//! queue processor
//!     → coordinator.rs (resolve circuit, read state, record outcome, lock queue)
//!     → circuit store (shared by all instances)
//!     → queueing service (lock / unlock)
//!
//! background:
//!     scheduler.rs   (half-open sweep, queue unlocks; one instance per tick)
//!     reconciler.rs  (rule set changes → close and remove circuits)
//! ```

pub mod coordinator;
pub mod reconciler;
pub mod scheduler;

pub use coordinator::{request_unique_id, QueueCircuitBreaker, QueuedRequest};
pub use reconciler::RuleChangeReconciler;
pub use scheduler::{MaintenanceScheduler, MaintenanceTask};
