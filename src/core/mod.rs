//! Core types for the callguard library.
//!
//! - [`types`] - `CircuitState` and `ServiceKind`
//! - [`error`] - Structured error types

pub mod error;
pub mod types;

pub use error::{BreakerError, PersistenceError, PersistenceResult};
pub use types::{CircuitState, ServiceKind};
