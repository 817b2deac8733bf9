//! The breaker registry implementation.

use crate::circuit_breaker::{BreakerConfigOverrides, BreakerMetrics, CircuitBreaker};
use crate::events::{BreakerEvent, EventBus};
use crate::persistence::{ArcPersistence, NoOpPersistence};
use crate::registry::config::RegistryConfig;
use crate::registry::health::SystemHealth;

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

/// Owns one [`CircuitBreaker`] per named service.
///
/// Breakers are created lazily on first use and share the registry's
/// persistence adapter. The registry re-publishes every breaker's
/// `state_change` and `failure` events on its own bus, so one subscription
/// observes the whole system.
///
/// The registry is constructed explicitly and shared, usually as an
/// `Arc<BreakerRegistry>`.
///
/// # Example
///
/// ```rust,ignore
/// use callguard::registry::BreakerRegistry;
///
/// let registry = BreakerRegistry::new();
/// let weather = registry.get_breaker("weather", None);
///
/// let forecast = weather.execute(|| client.forecast("nakuru")).await?;
///
/// let health = registry.system_health();
/// if !health.healthy {
///     tracing::warn!(unhealthy = ?health.unhealthy_services(), "Degraded dependencies");
/// }
/// ```
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: RegistryConfig,
    persistence: ArcPersistence,
    events: EventBus,
    /// Parent of every forwarding task's token; replaced on `destroy`.
    cancel: Mutex<CancellationToken>,
}

impl BreakerRegistry {
    /// Creates a registry with default configuration and no persistence.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns the breaker for `name`, creating it on first use.
    ///
    /// The configuration is resolved only when the breaker is created:
    /// service kind defaults, then the registry's per-service overrides, then
    /// `overrides`. Later calls return the existing breaker and ignore
    /// `overrides`.
    pub fn get_breaker(
        &self,
        name: &str,
        overrides: Option<&BreakerConfigOverrides>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return Arc::clone(existing.value());
        }

        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| self.create_breaker(name, overrides))
            .clone()
    }

    /// Returns the breaker for `name` if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the names of all breakers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns `true` if no breaker has been created.
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Returns a metrics snapshot per service.
    pub fn all_metrics(&self) -> BTreeMap<String, BreakerMetrics> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect()
    }

    /// Subscribes to forwarded `state_change` and `failure` events.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Reports the health of every breaker.
    pub fn system_health(&self) -> SystemHealth {
        SystemHealth::from_states(
            self.breakers
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().state())),
        )
    }

    /// Resets every breaker.
    pub fn reset_all(&self) {
        for breaker in self.snapshot() {
            breaker.reset();
        }
        tracing::info!(count = self.len(), "Reset all circuit breakers");
    }

    /// Disposes every breaker, stops forwarding and empties the registry.
    ///
    /// The registry stays usable; later lookups create fresh breakers.
    pub fn destroy(&self) {
        let previous = {
            let mut cancel = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *cancel, CancellationToken::new())
        };
        previous.cancel();

        let breakers = self.snapshot();
        self.breakers.clear();
        for breaker in &breakers {
            breaker.dispose();
        }
        tracing::info!(count = breakers.len(), "Circuit breaker registry destroyed");
    }

    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn create_breaker(
        &self,
        name: &str,
        overrides: Option<&BreakerConfigOverrides>,
    ) -> Arc<CircuitBreaker> {
        let config = self.config.resolve(name, overrides);
        let breaker = CircuitBreaker::builder(name)
            .with_config(config)
            .with_persistence(Arc::clone(&self.persistence))
            .with_snapshot_ttl(self.config.snapshot_ttl())
            .with_event_bus(EventBus::new(self.config.event_capacity))
            .build();
        self.forward_events(&breaker);

        tracing::debug!(service = %name, "Registered circuit breaker");
        breaker
    }

    /// Re-publishes a breaker's forwarded events on the registry bus.
    fn forward_events(&self, breaker: &CircuitBreaker) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(service = %breaker.name(), "No runtime; breaker events not forwarded");
            return;
        };

        // subscribe before the breaker can publish anything
        let mut rx = breaker.subscribe();
        let events = self.events.clone();
        let service = breaker.name().to_string();
        let token = self
            .cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .child_token();

        handle.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) if event.is_forwarded() => {
                            events.forward(event);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(service = %service, skipped, "Event forwarding lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BreakerRegistry {
    fn drop(&mut self) {
        self.cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .cancel();
    }
}

impl fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("services", &self.names())
            .field("config", &self.config)
            .field("persistence", &self.persistence)
            .finish()
    }
}

/// Builder for creating a [`BreakerRegistry`].
#[derive(Debug)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    persistence: ArcPersistence,
}

impl RegistryBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config: RegistryConfig::default(),
            persistence: Arc::new(NoOpPersistence),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the persistence adapter shared by every breaker.
    pub fn with_persistence(mut self, persistence: ArcPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Builds the registry.
    pub fn build(self) -> BreakerRegistry {
        BreakerRegistry {
            breakers: DashMap::new(),
            events: EventBus::new(self.config.event_capacity),
            config: self.config,
            persistence: self.persistence,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::BreakerConfig;
    use crate::core::CircuitState;
    use crate::mock::MockService;
    use crate::persistence::InMemoryPersistence;
    use std::time::Duration;

    fn fast_overrides() -> BreakerConfigOverrides {
        BreakerConfigOverrides::new()
            .failure_threshold(1)
            .max_retries(0)
            .retry_delay(Duration::ZERO)
    }

    async fn next_event(rx: &mut broadcast::Receiver<BreakerEvent>) -> BreakerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no event forwarded")
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_breaker_is_idempotent() {
        let registry = BreakerRegistry::new();

        let first = registry.get_breaker("weather", None);
        let second = registry.get_breaker("weather", Some(&fast_overrides()));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config(), &BreakerConfig::weather());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_config_resolution() {
        let config = RegistryConfig::new()
            .with_service("sms", BreakerConfigOverrides::new().failure_threshold(4));
        let registry = BreakerRegistry::builder().with_config(config).build();

        let sms = registry.get_breaker("sms", None);
        assert_eq!(sms.config().failure_threshold, 4);
        assert_eq!(sms.config().timeout, BreakerConfig::messaging().timeout);

        let vision = registry.get_breaker(
            "image_analysis",
            Some(&BreakerConfigOverrides::new().max_retries(0)),
        );
        assert_eq!(vision.config().max_retries, 0);
        assert_eq!(vision.config().timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_breaker() {
        let registry = Arc::new(BreakerRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.get_breaker("prices", None) })
            })
            .collect();

        let first = registry.get_breaker("prices", None);
        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.await.unwrap()));
        }
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_forwards_failures_and_state_changes() {
        let registry = BreakerRegistry::new();
        let mut rx = registry.subscribe();
        let service = MockService::new("sms");
        let breaker = registry.get_breaker("sms", Some(&fast_overrides()));

        // successes stay local to the breaker
        breaker.execute(|| service.call()).await.unwrap();
        service.set_failing(true);
        assert!(breaker.execute(|| service.call()).await.is_err());

        match next_event(&mut rx).await {
            BreakerEvent::Failure {
                service,
                consecutive_failures,
                ..
            } => {
                assert_eq!(service, "sms");
                assert_eq!(consecutive_failures, 1);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        match next_event(&mut rx).await {
            BreakerEvent::StateChange {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, CircuitState::Closed);
                assert_eq!(new_state, CircuitState::Open);
            }
            other => panic!("expected state change, got {other:?}"),
        }

        // rejections are not forwarded either
        assert!(breaker.execute(|| service.call()).await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_system_health() {
        let registry = BreakerRegistry::new();
        assert!(registry.system_health().healthy);

        registry.get_breaker("weather", None);
        registry.get_breaker("sms", None).force_open();

        let health = registry.system_health();
        assert!(!health.healthy);
        assert_eq!(health.total, 2);
        assert_eq!(health.unhealthy_count, 1);
        assert_eq!(health.per_service.get("weather"), Some(&true));
        assert_eq!(health.states.get("sms"), Some(&CircuitState::Open));
    }

    #[tokio::test]
    async fn test_names_and_metrics() {
        let registry = BreakerRegistry::new();
        let service = MockService::new("weather");
        registry.get_breaker("weather", None);
        registry.get_breaker("image_analysis", None);

        registry
            .get("weather")
            .unwrap()
            .execute(|| service.call())
            .await
            .unwrap();

        assert_eq!(registry.names(), vec!["image_analysis", "weather"]);
        let metrics = registry.all_metrics();
        assert_eq!(metrics["weather"].success_count, 1);
        assert_eq!(metrics["image_analysis"].total_requests, 0);
        assert!(registry.get("sms").is_none());
    }

    #[tokio::test]
    async fn test_reset_all() {
        let registry = BreakerRegistry::new();
        registry.get_breaker("weather", None).force_open();
        registry.get_breaker("sms", None).force_open();

        registry.reset_all();

        assert!(registry.system_health().healthy);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_destroy() {
        let registry = BreakerRegistry::new();
        let mut rx = registry.subscribe();
        let weather = registry.get_breaker("weather", Some(&fast_overrides()));

        registry.destroy();

        assert!(registry.is_empty());
        assert!(weather.is_disposed());

        // forwarding has stopped
        weather.force_open();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());

        // still usable afterwards
        let fresh = registry.get_breaker("weather", None);
        assert!(!Arc::ptr_eq(&weather, &fresh));
        assert!(!fresh.is_disposed());
    }

    #[tokio::test]
    async fn test_state_survives_new_registry() {
        let store = Arc::new(InMemoryPersistence::new());

        let first = BreakerRegistry::builder()
            .with_persistence(store.clone())
            .build();
        first.get_breaker("vision", None).force_open();
        tokio::time::sleep(Duration::from_millis(20)).await;
        first.destroy();

        let second = BreakerRegistry::builder().with_persistence(store).build();
        let vision = second.get_breaker("vision", None);
        vision.restore().await;

        assert!(vision.state().is_open());
        assert!(!second.system_health().healthy);
    }

    #[tokio::test]
    async fn test_saved_state_applies_to_first_call() {
        let store = Arc::new(InMemoryPersistence::new());
        let mut saved = BreakerMetrics::new();
        saved.set_state(CircuitState::Open);
        saved.last_state_change = chrono::Utc::now() - chrono::Duration::seconds(5);
        store.insert(
            crate::persistence::snapshot_key("weather"),
            serde_json::to_string(&saved).unwrap(),
            Duration::from_secs(3600),
        );

        let registry = BreakerRegistry::builder().with_persistence(store).build();
        let service = MockService::new("weather");

        let err = registry
            .get_breaker("weather", None)
            .execute(|| service.call())
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(service.call_count(), 0);
        assert!(registry.get("weather").unwrap().state().is_open());
    }

    #[tokio::test]
    async fn test_elapsed_saved_state_probes_on_first_call() {
        let store = Arc::new(InMemoryPersistence::new());
        let mut saved = BreakerMetrics::new();
        saved.set_state(CircuitState::Open);
        saved.last_state_change = chrono::Utc::now() - chrono::Duration::seconds(61);
        store.insert(
            crate::persistence::snapshot_key("weather"),
            serde_json::to_string(&saved).unwrap(),
            Duration::from_secs(3600),
        );

        let registry = BreakerRegistry::builder().with_persistence(store).build();
        let service = MockService::new("weather");
        let weather = registry.get_breaker("weather", None);

        assert!(weather.execute(|| service.call()).await.is_ok());
        assert_eq!(service.call_count(), 1);
        assert!(weather.state().is_half_open());
    }
}
