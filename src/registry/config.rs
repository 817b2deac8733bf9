//! Registry configuration.

use crate::circuit_breaker::{BreakerConfig, BreakerConfigOverrides, DEFAULT_SNAPSHOT_TTL};
use crate::events::DEFAULT_EVENT_CAPACITY;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for a [`BreakerRegistry`](crate::registry::BreakerRegistry).
///
/// ```rust
/// use callguard::registry::RegistryConfig;
///
/// let config = RegistryConfig::from_json(
///     r#"{
///         "event_capacity": 512,
///         "services": {
///             "sms": { "failure_threshold": 4, "retry_delay_ms": 250 }
///         }
///     }"#,
/// )
/// .unwrap();
/// assert_eq!(config.resolve("sms", None).failure_threshold, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Buffered events per registry subscriber.
    pub event_capacity: usize,

    /// How long persisted snapshots stay valid, in seconds.
    pub snapshot_ttl_secs: u64,

    /// Per-service overrides, applied over the service kind's defaults.
    pub services: HashMap<String, BreakerConfigOverrides>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            snapshot_ttl_secs: DEFAULT_SNAPSHOT_TTL.as_secs(),
            services: HashMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sets the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Sets the snapshot TTL.
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl_secs = ttl.as_secs().max(1);
        self
    }

    /// Adds overrides for one service.
    pub fn with_service(
        mut self,
        name: impl Into<String>,
        overrides: BreakerConfigOverrides,
    ) -> Self {
        self.services.insert(name.into(), overrides);
        self
    }

    /// Returns the snapshot TTL.
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_ttl_secs.max(1))
    }

    /// Resolves the configuration for a service.
    ///
    /// Service kind defaults, then the configured overrides for `name`,
    /// then the caller's overrides.
    pub fn resolve(&self, name: &str, overrides: Option<&BreakerConfigOverrides>) -> BreakerConfig {
        let mut config = BreakerConfig::for_service(name);
        if let Some(configured) = self.services.get(name) {
            config = config.merge(configured);
        }
        if let Some(overrides) = overrides {
            config = config.merge(overrides);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.snapshot_ttl(), DEFAULT_SNAPSHOT_TTL);
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_resolve_layers() {
        let config = RegistryConfig::new().with_service(
            "weather",
            BreakerConfigOverrides::new().failure_threshold(7).max_retries(0),
        );

        let resolved = config.resolve("weather", None);
        assert_eq!(resolved.failure_threshold, 7);
        assert_eq!(resolved.max_retries, 0);
        assert_eq!(resolved.monitoring_period, BreakerConfig::weather().monitoring_period);

        let caller = BreakerConfigOverrides::new().failure_threshold(2);
        let resolved = config.resolve("weather", Some(&caller));
        assert_eq!(resolved.failure_threshold, 2);
        assert_eq!(resolved.max_retries, 0);
    }

    #[test]
    fn test_unconfigured_service_uses_kind_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.resolve("sms", None), BreakerConfig::messaging());
    }

    #[test]
    fn test_from_json() {
        let config = RegistryConfig::from_json(
            r#"{ "snapshot_ttl_secs": 120, "services": { "image_analysis": { "timeout_ms": 45000 } } }"#,
        )
        .unwrap();

        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(config.snapshot_ttl(), Duration::from_secs(120));
        assert_eq!(
            config.resolve("image_analysis", None).timeout,
            Duration::from_secs(45)
        );

        assert!(RegistryConfig::from_json(r#"{ "capacity": 1 }"#).is_err());
    }
}
