//! Circuit breaker configuration.

use crate::core::ServiceKind;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a circuit breaker.
///
/// A configuration is immutable once a breaker has been built with it.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Consecutive half-open successes that close the circuit.
    pub success_threshold: u32,

    /// Deadline for a single attempt.
    pub timeout: Duration,

    /// How long the circuit stays open before a trial call is allowed.
    pub reset_timeout: Duration,

    /// Length of the sliding window used for the error rate.
    pub monitoring_period: Duration,

    /// Minimum samples in the window before the error rate can open the circuit.
    pub volume_threshold: u32,

    /// Error rate (percent) at or above which the circuit opens.
    pub error_threshold_percentage: f64,

    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base unit of the linear retry backoff.
    pub retry_delay: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(10),
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(60),
            volume_threshold: 10,
            error_threshold_percentage: 50.0,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl BreakerConfig {
    /// Creates a new configuration with generic defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default configuration for a service kind.
    pub fn for_kind(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::ImageAnalysis => Self::image_analysis(),
            ServiceKind::Weather => Self::weather(),
            ServiceKind::MarketPrice => Self::market_price(),
            ServiceKind::Messaging => Self::messaging(),
            ServiceKind::Generic => Self::default(),
        }
    }

    /// Returns the default configuration for a service key.
    ///
    /// Unknown keys fall back to the generic defaults.
    pub fn for_service(key: &str) -> Self {
        Self::for_kind(ServiceKind::from_key(key))
    }

    /// Defaults for a high-latency AI vision service.
    ///
    /// Long per-attempt deadline, long cool-down, a single retry.
    pub fn image_analysis() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            reset_timeout: Duration::from_secs(120),
            monitoring_period: Duration::from_secs(300),
            volume_threshold: 5,
            error_threshold_percentage: 50.0,
            max_retries: 1,
            retry_delay: Duration::from_secs(2),
        }
    }

    /// Defaults for a weather forecast provider.
    pub fn weather() -> Self {
        Self {
            monitoring_period: Duration::from_secs(120),
            ..Self::default()
        }
    }

    /// Defaults for a market price feed.
    pub fn market_price() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            monitoring_period: Duration::from_secs(120),
            ..Self::default()
        }
    }

    /// Defaults for a lightweight messaging gateway.
    ///
    /// Short deadline, short cool-down, aggressive retries.
    pub fn messaging() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 2,
            timeout: Duration::from_secs(5),
            reset_timeout: Duration::from_secs(30),
            monitoring_period: Duration::from_secs(60),
            volume_threshold: 20,
            error_threshold_percentage: 60.0,
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the success threshold.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the open to half-open delay.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Sets the sliding window length.
    pub fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = period;
        self
    }

    /// Sets the minimum sample count for rate-based opening.
    pub fn with_volume_threshold(mut self, threshold: u32) -> Self {
        self.volume_threshold = threshold.max(1);
        self
    }

    /// Sets the error rate (percent) that opens the circuit.
    pub fn with_error_threshold_percentage(mut self, percentage: f64) -> Self {
        self.error_threshold_percentage = percentage.clamp(1.0, 100.0);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Applies caller overrides on top of this configuration.
    pub fn merge(self, overrides: &BreakerConfigOverrides) -> Self {
        let mut config = self;
        if let Some(v) = overrides.failure_threshold {
            config = config.with_failure_threshold(v);
        }
        if let Some(v) = overrides.success_threshold {
            config = config.with_success_threshold(v);
        }
        if let Some(ms) = overrides.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = overrides.reset_timeout_ms {
            config = config.with_reset_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = overrides.monitoring_period_ms {
            config = config.with_monitoring_period(Duration::from_millis(ms));
        }
        if let Some(v) = overrides.volume_threshold {
            config = config.with_volume_threshold(v);
        }
        if let Some(v) = overrides.error_threshold_percentage {
            config = config.with_error_threshold_percentage(v);
        }
        if let Some(v) = overrides.max_retries {
            config = config.with_max_retries(v);
        }
        if let Some(ms) = overrides.retry_delay_ms {
            config = config.with_retry_delay(Duration::from_millis(ms));
        }
        config
    }
}

/// Caller-supplied configuration, every option optional.
///
/// Durations are expressed in milliseconds so the struct can be read
/// straight from JSON.
///
/// ```rust
/// use callguard::circuit_breaker::{BreakerConfig, BreakerConfigOverrides};
///
/// let overrides: BreakerConfigOverrides =
///     serde_json::from_str(r#"{ "failure_threshold": 2, "timeout_ms": 2500 }"#).unwrap();
/// let config = BreakerConfig::for_service("sms").merge(&overrides);
/// assert_eq!(config.failure_threshold, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerConfigOverrides {
    /// See [`BreakerConfig::failure_threshold`].
    pub failure_threshold: Option<u32>,
    /// See [`BreakerConfig::success_threshold`].
    pub success_threshold: Option<u32>,
    /// See [`BreakerConfig::timeout`].
    pub timeout_ms: Option<u64>,
    /// See [`BreakerConfig::reset_timeout`].
    pub reset_timeout_ms: Option<u64>,
    /// See [`BreakerConfig::monitoring_period`].
    pub monitoring_period_ms: Option<u64>,
    /// See [`BreakerConfig::volume_threshold`].
    pub volume_threshold: Option<u32>,
    /// See [`BreakerConfig::error_threshold_percentage`].
    pub error_threshold_percentage: Option<f64>,
    /// See [`BreakerConfig::max_retries`].
    pub max_retries: Option<u32>,
    /// See [`BreakerConfig::retry_delay`].
    pub retry_delay_ms: Option<u64>,
}

impl BreakerConfigOverrides {
    /// Creates an empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    /// Overrides the success threshold.
    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    /// Overrides the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Overrides the reset timeout.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Overrides the monitoring period.
    pub fn monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period_ms = Some(period.as_millis() as u64);
        self
    }

    /// Overrides the volume threshold.
    pub fn volume_threshold(mut self, threshold: u32) -> Self {
        self.volume_threshold = Some(threshold);
        self
    }

    /// Overrides the error threshold percentage.
    pub fn error_threshold_percentage(mut self, percentage: f64) -> Self {
        self.error_threshold_percentage = Some(percentage);
        self
    }

    /// Overrides the retry count.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Overrides the retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = Some(delay.as_millis() as u64);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.reset_timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_kind_defaults_differ() {
        let vision = BreakerConfig::for_service("image_analysis");
        let sms = BreakerConfig::for_service("sms");

        assert!(vision.timeout > sms.timeout);
        assert!(vision.reset_timeout > sms.reset_timeout);
        assert!(vision.max_retries < sms.max_retries);
    }

    #[test]
    fn test_unknown_service_uses_generic() {
        assert_eq!(BreakerConfig::for_service("crop-db"), BreakerConfig::default());
    }

    #[test]
    fn test_config_builder() {
        let config = BreakerConfig::new()
            .with_failure_threshold(0)
            .with_error_threshold_percentage(250.0)
            .with_reset_timeout(Duration::from_secs(5));

        assert_eq!(config.failure_threshold, 1);
        assert_eq!(config.error_threshold_percentage, 100.0);
        assert_eq!(config.reset_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_merge_overrides() {
        let overrides = BreakerConfigOverrides::new()
            .failure_threshold(2)
            .retry_delay(Duration::from_millis(250));
        let config = BreakerConfig::weather().merge(&overrides);

        assert_eq!(config.failure_threshold, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.monitoring_period, BreakerConfig::weather().monitoring_period);
    }

    #[test]
    fn test_overrides_from_json() {
        let overrides: BreakerConfigOverrides =
            serde_json::from_str(r#"{ "max_retries": 0, "reset_timeout_ms": 1500 }"#).unwrap();
        let config = BreakerConfig::default().merge(&overrides);

        assert_eq!(config.max_retries, 0);
        assert_eq!(config.reset_timeout, Duration::from_millis(1500));

        let bad = serde_json::from_str::<BreakerConfigOverrides>(r#"{ "treshold": 1 }"#);
        assert!(bad.is_err());
    }
}
