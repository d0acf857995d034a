//! Circuit state, statistics and storage.
//!
//! # Data Flow
//! ```text
//! queued request outcome
//!     → statistics.rs (dedup, prune, decide transition)
//!     → store.rs (atomic per-circuit update, shared by all instances)
//!     → state.rs (Closed / HalfOpen / Open)
//! ```
//!
//! # Design Decisions
//! - The store is the single source of truth; instances keep no circuit state
//! - Unknown circuits read as Closed
//! - memory.rs is the single-node store; shared backends implement the same trait

pub mod error;
pub mod memory;
pub mod state;
pub mod statistics;
pub mod store;

pub use error::{BreakerResult, CircuitBreakerError};
pub use memory::InMemoryCircuitStore;
pub use state::{CircuitInfo, CircuitState, QueueResponseType, UpdateStatisticsResult};
pub use statistics::{Sample, SampleWindow, StatisticsEngine, Thresholds};
pub use store::CircuitStore;
