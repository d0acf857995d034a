//! Routing rules as seen by the circuit breaker.
//!
//! # Data Flow
//! ```text
//! RuleConfig[] (config file)
//!     → matcher.rs (compile patterns into Rules)
//!     → provider.rs (push full rule list on change)
//!     → mapping.rs (pattern → circuit identity, removed circuits)
//!
//! Queued request URI
//!     → mapping.rs (first matching rule)
//!     → Return: circuit identity or no mapping
//! ```
//!
//! # Design Decisions
//! - Rules are compiled once per rule set, lookups are lock-free
//! - Deterministic: same rule list always yields the same identities
//! - First match wins (rule list order)

pub mod mapping;
pub mod matcher;
pub mod provider;

pub use mapping::{PatternAndCircuitHash, RulePatternToCircuitMapping};
pub use matcher::Rule;
pub use provider::RuleProvider;
