//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → resource.rs swaps the breaker section atomically
//!     → scheduler re-registers its periodic tasks
//!     → rule provider publishes the new rule list
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Thresholds are read per call, task intervals per registration

pub mod loader;
pub mod resource;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use resource::ConfigurationResource;
pub use schema::{CircuitBreakerConfig, GatewayConfig, RuleConfig, TaskConfig};
