//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → stop scheduler and reconciler → drain admin server
//!     → close queue service client once in-flight calls finish (defer_close.rs)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop timers, drain, close
//! - Shutdown has timeout: forced exit after deadline

pub mod defer_close;
pub mod shutdown;
pub mod signals;

pub use defer_close::{Close, DeferClose};
pub use shutdown::Shutdown;
