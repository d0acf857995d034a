//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to store / lock / queue service:
//!     → timeouts.rs (enforce deadline)
//!     → On timeout: CircuitBreakerError::Timeout, treated as transient
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: periodic tasks simply try again on their next tick

pub mod timeouts;
