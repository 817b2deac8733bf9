//! Per-service call bookkeeping.

use crate::core::CircuitState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counters and timestamps describing one service's call history.
///
/// This is also the snapshot written to the persistence adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Current state of the circuit.
    pub state: CircuitState,
    /// When the state last changed.
    pub last_state_change: DateTime<Utc>,

    /// Failures since the circuit last closed.
    pub failure_count: u64,
    /// Successes since the circuit last closed.
    pub success_count: u64,
    /// Failures in a row.
    pub consecutive_failures: u32,
    /// Successes in a row.
    pub consecutive_successes: u32,

    /// Time of the last failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Time of the last success.
    pub last_success_time: Option<DateTime<Utc>>,

    /// Running mean latency of successful calls, in milliseconds.
    pub average_latency_ms: f64,
    /// Number of samples folded into `average_latency_ms`.
    #[serde(default)]
    pub latency_samples: u64,

    /// Calls seen over the breaker's lifetime, rejections included.
    #[serde(default)]
    pub total_requests: u64,
    /// Calls rejected without being attempted.
    #[serde(default)]
    pub rejected_requests: u64,
    /// Number of times the circuit has opened.
    #[serde(default)]
    pub times_opened: u64,
    /// Number of times the circuit has closed from half-open.
    #[serde(default)]
    pub times_closed: u64,
}

impl Default for BreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerMetrics {
    /// Creates empty metrics in the closed state.
    pub fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            last_state_change: Utc::now(),
            failure_count: 0,
            success_count: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            last_success_time: None,
            average_latency_ms: 0.0,
            latency_samples: 0,
            total_requests: 0,
            rejected_requests: 0,
            times_opened: 0,
            times_closed: 0,
        }
    }

    /// Records a successful call.
    pub fn record_success(&mut self, latency: Duration) {
        self.total_requests += 1;
        self.success_count += 1;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
        self.last_success_time = Some(Utc::now());

        self.latency_samples += 1;
        let sample = latency.as_secs_f64() * 1000.0;
        self.average_latency_ms += (sample - self.average_latency_ms) / self.latency_samples as f64;
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.failure_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
        self.last_failure_time = Some(Utc::now());
    }

    /// Records a call rejected by the breaker.
    pub fn record_rejected(&mut self) {
        self.total_requests += 1;
        self.rejected_requests += 1;
    }

    /// Sets the state and stamps the transition time.
    ///
    /// Entering `Closed` starts a fresh trust window: the success and
    /// failure counters go back to zero. Entering `Open` or `HalfOpen` only
    /// clears the success streak; everything else is preserved for
    /// inspection.
    pub(crate) fn set_state(&mut self, state: CircuitState) {
        match state {
            CircuitState::Closed => {
                self.failure_count = 0;
                self.success_count = 0;
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
                if self.state.is_half_open() {
                    self.times_closed += 1;
                }
            }
            CircuitState::Open => {
                self.consecutive_successes = 0;
                self.times_opened += 1;
            }
            CircuitState::HalfOpen => {
                self.consecutive_successes = 0;
            }
        }
        self.state = state;
        self.last_state_change = Utc::now();
    }

    /// Returns the share of attempted calls that succeeded (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        let attempted = self.success_count + self.failure_count;
        if attempted == 0 {
            return 1.0;
        }
        self.success_count as f64 / attempted as f64
    }

    /// Returns the share of attempted calls that failed (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        let attempted = self.success_count + self.failure_count;
        if attempted == 0 {
            return 0.0;
        }
        self.failure_count as f64 / attempted as f64
    }
}
