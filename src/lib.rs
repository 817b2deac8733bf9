//! # Callguard
//!
//! A resilient invocation layer for calls to unreliable external services,
//! with per-service circuit breakers, bounded retries, timeouts, fallbacks
//! and durable breaker state.
//!
//! ## Overview
//!
//! Callguard wraps every outbound call (an AI vision API, a weather provider,
//! a market price feed, an SMS gateway) so that a failing dependency cannot
//! drag its callers down with it. It lets you:
//!
//! - Bound each attempt with a timeout and retry with linear backoff
//! - Stop calling a failing service, then probe it for recovery
//! - Serve a fallback value when a call is rejected or exhausted
//! - Keep breaker state across restarts through a persistence adapter
//! - Watch transitions and failures through typed events and `tracing`
//! - Report aggregated health for a status endpoint
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use callguard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = BreakerRegistry::new();
//!     let weather = registry.get_breaker("weather", None);
//!
//!     let forecast = weather
//!         .execute_with_fallback(
//!             || client.forecast("eldoret"),
//!             || async { Ok(cache.last_forecast("eldoret")) },
//!         )
//!         .await?;
//!
//!     println!("healthy: {}", registry.system_health().healthy);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: Circuit states, service kinds and error types
//! - **Circuit Breaker**: State machine, sliding window, retry and timeout
//! - **Events**: Typed broadcast bus and structured log records
//! - **Persistence**: Snapshot storage behind an async trait
//! - **Registry**: One breaker per service, event forwarding, health

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod circuit_breaker;
pub mod core;
pub mod events;
pub mod mock;
pub mod persistence;
pub mod registry;

// Re-export commonly used types at the crate root
pub use crate::core::{BreakerError, CircuitState, PersistenceError, ServiceKind};

pub use crate::circuit_breaker::{
    BreakerConfig, BreakerConfigOverrides, BreakerMetrics, CircuitBreaker,
};
pub use crate::events::{BreakerEvent, EventBus};
pub use crate::persistence::{
    FilesystemPersistence, InMemoryPersistence, NoOpPersistence, PersistenceAdapter,
};
pub use crate::registry::{BreakerRegistry, RegistryConfig, SystemHealth};

/// Prelude module for convenient imports.
///
/// ```rust
/// use callguard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{
        BreakerConfig, BreakerConfigOverrides, BreakerMetrics, CircuitBreaker,
    };
    pub use crate::core::{BreakerError, CircuitState, PersistenceError, ServiceKind};
    pub use crate::events::{BreakerEvent, EventBus};
    pub use crate::persistence::{NoOpPersistence, PersistenceAdapter};
    pub use crate::registry::{BreakerRegistry, RegistryConfig, SystemHealth};
}
