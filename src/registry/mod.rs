//! Multi-service breaker registry.
//!
//! A [`BreakerRegistry`] lazily creates one circuit breaker per service name,
//! resolves each breaker's configuration from the service kind's defaults and
//! any configured overrides, forwards `state_change` and `failure` events to a
//! single bus and reports aggregated [`SystemHealth`].

mod config;
mod health;
#[allow(clippy::module_inception)]
mod registry;

pub use config::RegistryConfig;
pub use health::SystemHealth;
pub use registry::{BreakerRegistry, RegistryBuilder};
