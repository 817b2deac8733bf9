//! Circuit breaker implementation.

use crate::circuit_breaker::config::BreakerConfig;
use crate::circuit_breaker::retry::RetryPolicy;
use crate::circuit_breaker::state::BreakerMetrics;
use crate::circuit_breaker::window::SlidingWindow;
use crate::core::{BreakerError, CircuitState};
use crate::events::{BreakerEvent, EventBus, DEFAULT_EVENT_CAPACITY};
use crate::persistence::{snapshot_key, ArcPersistence, NoOpPersistence};

use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, OnceCell};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How long persisted snapshots stay valid.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(60 * 60);

/// Mutable state guarded by the breaker's lock.
#[derive(Debug)]
struct BreakerCore {
    metrics: BreakerMetrics,
    window: SlidingWindow,
    /// Monotonic time of the last state change; drives the open cool-down.
    state_since: Instant,
    /// Open time carried over from a restored snapshot.
    carried: Duration,
    /// Set once anything has been recorded, so a late snapshot load never
    /// overwrites live state.
    touched: bool,
}

/// Why a call was not let through.
struct Rejection {
    state: CircuitState,
    retry_in: Option<Duration>,
}

/// A circuit breaker guarding calls to one external service.
///
/// The breaker wraps each call with a per-attempt timeout and bounded
/// retries, records the outcome, and opens the circuit when the service is
/// failing so that subsequent calls are rejected without being attempted.
///
/// # States
///
/// - **Closed**: Normal operation. Calls pass through, failures are counted.
/// - **Open**: Service is failing. Calls are rejected immediately.
/// - **Half-Open**: After the reset timeout, trial calls are let through;
///   enough successes close the circuit, one failure re-opens it.
///
/// # Example
///
/// ```rust,ignore
/// use callguard::circuit_breaker::{BreakerConfig, CircuitBreaker};
///
/// let breaker = CircuitBreaker::new("weather", BreakerConfig::weather());
///
/// let forecast = breaker
///     .execute_with_fallback(
///         || weather_client.forecast(region),
///         || async { Ok(Forecast::cached(region)) },
///     )
///     .await?;
/// ```
pub struct CircuitBreaker {
    /// Service name.
    name: String,
    /// Configuration.
    config: BreakerConfig,
    /// Derived retry bounds.
    retry: RetryPolicy,
    /// State, counters and window.
    core: Mutex<BreakerCore>,
    /// Event fan-out.
    events: EventBus,
    /// Snapshot storage.
    persistence: ArcPersistence,
    /// TTL for stored snapshots.
    snapshot_ttl: Duration,
    /// Result of the one-time snapshot load.
    restored: OnceCell<bool>,
    /// Load the snapshot before the first call.
    auto_restore: bool,
    /// Set by `dispose`; no persistence writes afterwards.
    disposed: AtomicBool,
    /// Stops background tasks.
    cancel: CancellationToken,
}

impl CircuitBreaker {
    /// Creates a breaker with no persistence.
    ///
    /// Must be called from within a tokio runtime for the periodic window
    /// cleanup to run; without one the breaker still works and prunes its
    /// window on every recorded outcome.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Arc<Self> {
        Self::builder(name).with_config(config).build()
    }

    /// Returns a builder for a breaker named `name`.
    pub fn builder(name: impl Into<String>) -> BreakerBuilder {
        BreakerBuilder::new(name)
    }

    /// Returns the service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current state.
    ///
    /// An open circuit whose reset timeout has elapsed is still reported as
    /// open until the next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.lock().metrics.state
    }

    /// Returns a copy of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.lock().metrics.clone()
    }

    /// Returns `true` if the circuit is closed.
    pub fn is_healthy(&self) -> bool {
        self.state().is_closed()
    }

    /// Error rate in percent over the monitoring period, `None` without samples.
    pub fn error_rate(&self) -> Option<f64> {
        self.lock().window.error_percentage()
    }

    /// Number of samples currently held by the sliding window.
    pub fn window_len(&self) -> usize {
        self.lock().window.len()
    }

    /// Subscribes to this breaker's events.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Returns `true` once the breaker has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Runs `operation` under the breaker's protection.
    ///
    /// The operation is attempted up to `1 + max_retries` times, each attempt
    /// bounded by the configured timeout. Dropping the returned future
    /// abandons the call and records nothing.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::CircuitOpen`] if the call was rejected.
    /// - [`BreakerError::Timeout`] if the last attempt timed out.
    /// - [`BreakerError::Operation`] with the last attempt's own error.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.call(operation, None::<fn() -> std::future::Ready<Result<T, E>>>)
            .await
    }

    /// Runs `operation` under the breaker's protection, serving `fallback`
    /// when the call is rejected or all attempts fail.
    ///
    /// On rejection the fallback's own result is returned, error included.
    /// After exhausted attempts a failing fallback yields the original error.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.call(operation, Some(fallback)).await
    }

    async fn call<T, E, F, Fut, G, GFut>(
        &self,
        mut operation: F,
        fallback: Option<G>,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if self.auto_restore {
            self.restore().await;
        }

        if let Err(rejection) = self.should_allow_request() {
            return match fallback {
                Some(fallback) => {
                    tracing::debug!(service = %self.name, "Serving fallback for rejected call");
                    fallback().await.map_err(BreakerError::Operation)
                }
                None => Err(BreakerError::circuit_open(
                    &self.name,
                    rejection.state,
                    rejection.retry_in,
                )),
            };
        }

        let mut attempt = 0;
        let (error, latency) = loop {
            attempt += 1;
            let started = Instant::now();
            let error = match tokio::time::timeout(self.config.timeout, operation()).await {
                Ok(Ok(value)) => {
                    self.record_success(started.elapsed());
                    return Ok(value);
                }
                Ok(Err(e)) => BreakerError::Operation(e),
                Err(_) => BreakerError::timeout(&self.name, self.config.timeout),
            };
            let latency = started.elapsed();

            if !self.retry.should_retry(attempt) {
                break (error, latency);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            tracing::debug!(
                service = %self.name,
                attempt,
                max_attempts = self.retry.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed; backing off"
            );
            self.events.publish(BreakerEvent::RetryAttempt {
                service: self.name.clone(),
                attempt: attempt + 1,
            });
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        };

        self.record_failure(&error, latency);

        match fallback {
            Some(fallback) => match fallback().await {
                Ok(value) => {
                    tracing::debug!(service = %self.name, "Fallback served after failed call");
                    Ok(value)
                }
                Err(fallback_error) => {
                    tracing::warn!(
                        service = %self.name,
                        error = %error,
                        fallback_error = %fallback_error,
                        "Fallback failed; returning original error"
                    );
                    Err(error)
                }
            },
            None => Err(error),
        }
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        let snapshot = {
            let mut core = self.lock();
            core.touched = true;
            self.transition(&mut core, CircuitState::Open);
            core.metrics.clone()
        };
        self.persist(snapshot);
    }

    /// Forces the circuit into the closed state.
    pub fn force_close(&self) {
        let snapshot = {
            let mut core = self.lock();
            core.touched = true;
            self.transition(&mut core, CircuitState::Closed);
            core.metrics.clone()
        };
        self.persist(snapshot);
    }

    /// Resets the breaker to a fresh closed state with empty metrics.
    pub fn reset(&self) {
        let snapshot = {
            let mut core = self.lock();
            let old_state = core.metrics.state;
            core.touched = true;
            core.metrics = BreakerMetrics::new();
            core.window.clear();
            core.state_since = Instant::now();
            core.carried = Duration::ZERO;

            self.events.publish(BreakerEvent::Reset {
                service: self.name.clone(),
            });
            if !old_state.is_closed() {
                self.events.publish(BreakerEvent::StateChange {
                    service: self.name.clone(),
                    old_state,
                    new_state: CircuitState::Closed,
                    timestamp: core.metrics.last_state_change,
                });
            }
            core.metrics.clone()
        };
        self.persist(snapshot);
    }

    /// Stops background tasks and persistence writes.
    ///
    /// The breaker keeps answering calls; only durability and periodic
    /// cleanup stop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        tracing::debug!(service = %self.name, "Circuit breaker disposed");
    }

    /// Loads a previously saved snapshot, once.
    ///
    /// The load only applies if nothing has been recorded yet. A snapshot
    /// saved as open whose reset timeout has already elapsed resumes as
    /// half-open. Returns whether a snapshot was applied.
    pub async fn restore(&self) -> bool {
        *self.restored.get_or_init(|| self.load_snapshot()).await
    }

    async fn load_snapshot(&self) -> bool {
        let key = snapshot_key(&self.name);
        let raw = match self.persistence.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(service = %self.name, error = %e, "Failed to load breaker snapshot");
                return false;
            }
        };
        let snapshot: BreakerMetrics = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(service = %self.name, error = %e, "Discarding unreadable breaker snapshot");
                return false;
            }
        };
        self.apply_snapshot(snapshot)
    }

    fn apply_snapshot(&self, snapshot: BreakerMetrics) -> bool {
        let snapshot = {
            let mut core = self.lock();
            if core.touched {
                tracing::debug!(service = %self.name, "Live state already recorded; snapshot ignored");
                return false;
            }

            let elapsed = (Utc::now() - snapshot.last_state_change)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let state = snapshot.state;
            core.metrics = snapshot;
            // the monotonic clock may not reach back past a reboot
            core.state_since = Instant::now();
            core.carried = elapsed.min(self.config.reset_timeout);

            if state.is_open() && elapsed >= self.config.reset_timeout {
                self.transition(&mut core, CircuitState::HalfOpen);
            }

            tracing::info!(
                service = %self.name,
                state = %core.metrics.state,
                saved_state = %state,
                "Restored breaker snapshot"
            );
            core.metrics.clone()
        };
        self.persist(snapshot);
        true
    }

    /// Checks if a call should be allowed through.
    fn should_allow_request(&self) -> Result<(), Rejection> {
        let (rejection, snapshot) = {
            let mut core = self.lock();

            let rejection = match core.metrics.state {
                CircuitState::Closed => return Ok(()),

                CircuitState::Open => {
                    let elapsed = core.state_since.elapsed() + core.carried;
                    if elapsed >= self.config.reset_timeout {
                        core.touched = true;
                        self.transition(&mut core, CircuitState::HalfOpen);
                        None
                    } else {
                        Some(Rejection {
                            state: CircuitState::Open,
                            retry_in: Some(self.config.reset_timeout - elapsed),
                        })
                    }
                }

                CircuitState::HalfOpen => {
                    if core.metrics.consecutive_successes >= self.config.success_threshold {
                        Some(Rejection {
                            state: CircuitState::HalfOpen,
                            retry_in: None,
                        })
                    } else {
                        return Ok(());
                    }
                }
            };

            if let Some(rejection) = &rejection {
                core.touched = true;
                core.metrics.record_rejected();
                self.events.publish(BreakerEvent::RequestRejected {
                    service: self.name.clone(),
                    state: rejection.state,
                });
            }
            (rejection, core.metrics.clone())
        };

        match rejection {
            Some(rejection) => Err(rejection),
            None => {
                self.persist(snapshot);
                Ok(())
            }
        }
    }

    /// Records a successful call.
    fn record_success(&self, latency: Duration) {
        let snapshot = {
            let mut core = self.lock();
            core.touched = true;
            core.metrics.record_success(latency);
            core.window.record(true, latency);

            self.events.publish(BreakerEvent::Success {
                service: self.name.clone(),
                latency_ms: latency.as_millis() as u64,
            });

            if core.metrics.state.is_half_open()
                && core.metrics.consecutive_successes >= self.config.success_threshold
            {
                self.transition(&mut core, CircuitState::Closed);
            }
            core.metrics.clone()
        };
        self.persist(snapshot);
    }

    /// Records a call that failed after all attempts.
    fn record_failure<E: fmt::Display>(&self, error: &BreakerError<E>, latency: Duration) {
        let snapshot = {
            let mut core = self.lock();
            core.touched = true;
            core.metrics.record_failure();
            core.window.record(false, latency);

            self.events.publish(BreakerEvent::Failure {
                service: self.name.clone(),
                error: error.to_string(),
                consecutive_failures: core.metrics.consecutive_failures,
            });

            match core.metrics.state {
                CircuitState::Closed => {
                    let too_many_in_a_row =
                        core.metrics.consecutive_failures >= self.config.failure_threshold;
                    let rate_exceeded = core.window.exceeds(
                        self.config.volume_threshold,
                        self.config.error_threshold_percentage,
                    );
                    if too_many_in_a_row || rate_exceeded {
                        self.transition(&mut core, CircuitState::Open);
                    }
                }
                CircuitState::HalfOpen => {
                    // any failure during probation re-opens the circuit
                    self.transition(&mut core, CircuitState::Open);
                }
                CircuitState::Open => {}
            }
            core.metrics.clone()
        };
        self.persist(snapshot);
    }

    /// Moves to `new_state`, stamping the time and publishing the change.
    fn transition(&self, core: &mut BreakerCore, new_state: CircuitState) {
        let old_state = core.metrics.state;
        if old_state == new_state {
            return;
        }

        core.metrics.set_state(new_state);
        core.state_since = Instant::now();
        core.carried = Duration::ZERO;
        if new_state.is_closed() {
            core.window.clear();
        }

        self.events.publish(BreakerEvent::StateChange {
            service: self.name.clone(),
            old_state,
            new_state,
            timestamp: core.metrics.last_state_change,
        });
    }

    /// Writes a snapshot in the background. Failures are only logged.
    fn persist(&self, snapshot: BreakerMetrics) {
        if self.is_disposed() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::trace!(service = %self.name, "No runtime; snapshot not persisted");
            return;
        };

        let persistence = Arc::clone(&self.persistence);
        let service = self.name.clone();
        let ttl = self.snapshot_ttl;
        handle.spawn(async move {
            let value = match serde_json::to_string(&snapshot) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "Failed to encode breaker snapshot");
                    return;
                }
            };
            if let Err(e) = persistence
                .set_with_ttl(&snapshot_key(&service), value, ttl)
                .await
            {
                tracing::warn!(service = %service, error = %e, "Failed to persist breaker snapshot");
            }
        });
    }

    /// Prunes the window and refreshes the stored snapshot.
    fn run_maintenance(&self) {
        let snapshot = {
            let mut core = self.lock();
            core.window.prune();
            core.metrics.clone()
        };
        self.persist(snapshot);
    }

    fn start_background_tasks(self: &Arc<Self>, restore: bool) {
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!(service = %self.name, "No runtime; background tasks not started");
            return;
        };

        if restore {
            let weak = Arc::downgrade(self);
            handle.spawn(async move {
                if let Some(breaker) = weak.upgrade() {
                    breaker.restore().await;
                }
            });
        }

        let weak = Arc::downgrade(self);
        let token = self.cancel.clone();
        let period = self.config.monitoring_period.max(Duration::from_secs(1));
        handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(breaker) = weak.upgrade() else { break };
                        breaker.run_maintenance();
                    }
                }
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CircuitBreaker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.lock().metrics.state)
            .field("config", &self.config)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for creating a [`CircuitBreaker`].
pub struct BreakerBuilder {
    name: String,
    config: Option<BreakerConfig>,
    persistence: ArcPersistence,
    events: Option<EventBus>,
    snapshot_ttl: Duration,
    restore: bool,
}

impl BreakerBuilder {
    /// Creates a builder for a breaker named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: None,
            persistence: Arc::new(NoOpPersistence),
            events: None,
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            restore: true,
        }
    }

    /// Sets the configuration. Defaults to the service kind's defaults.
    pub fn with_config(mut self, config: BreakerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the persistence adapter.
    pub fn with_persistence(mut self, persistence: ArcPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Sets the event bus the breaker publishes on.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Sets the TTL of persisted snapshots.
    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    /// Controls whether the snapshot is loaded automatically.
    ///
    /// When enabled, construction starts the load in the background and the
    /// first call waits for it to finish. When disabled, call
    /// [`CircuitBreaker::restore`] explicitly.
    pub fn with_restore_on_start(mut self, restore: bool) -> Self {
        self.restore = restore;
        self
    }

    /// Builds the breaker and starts its background tasks.
    pub fn build(self) -> Arc<CircuitBreaker> {
        let config = self
            .config
            .unwrap_or_else(|| BreakerConfig::for_service(&self.name));

        let breaker = Arc::new(CircuitBreaker {
            retry: RetryPolicy::from(&config),
            core: Mutex::new(BreakerCore {
                metrics: BreakerMetrics::new(),
                window: SlidingWindow::new(config.monitoring_period),
                state_since: Instant::now(),
                carried: Duration::ZERO,
                touched: false,
            }),
            events: self
                .events
                .unwrap_or_else(|| EventBus::new(DEFAULT_EVENT_CAPACITY)),
            persistence: self.persistence,
            snapshot_ttl: self.snapshot_ttl,
            restored: OnceCell::new(),
            auto_restore: self.restore,
            disposed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            name: self.name,
            config,
        });

        breaker.start_background_tasks(self.restore);
        tracing::debug!(service = %breaker.name, "Circuit breaker created");
        breaker
    }

    /// Builds the breaker and waits for the snapshot load to finish.
    pub async fn build_restored(self) -> Arc<CircuitBreaker> {
        let breaker = self.build();
        breaker.restore().await;
        breaker
    }
}

impl fmt::Debug for BreakerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("snapshot_ttl", &self.snapshot_ttl)
            .finish()
    }
}
