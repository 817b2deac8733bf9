//! Breaker event types and emission.

use crate::core::CircuitState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something observable that happened inside a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum BreakerEvent {
    /// The circuit moved between states.
    StateChange {
        /// Service name.
        service: String,
        /// Previous state.
        old_state: CircuitState,
        /// New state.
        new_state: CircuitState,
        /// When the transition happened.
        timestamp: DateTime<Utc>,
    },

    /// A call failed after exhausting its retries.
    Failure {
        /// Service name.
        service: String,
        /// Rendered error of the last attempt.
        error: String,
        /// Failures in a row, this one included.
        consecutive_failures: u32,
    },

    /// A call succeeded.
    Success {
        /// Service name.
        service: String,
        /// Latency of the successful attempt in milliseconds.
        latency_ms: u64,
    },

    /// An attempt failed and another one is about to start.
    RetryAttempt {
        /// Service name.
        service: String,
        /// The attempt that is about to start (2 for the first retry).
        attempt: u32,
    },

    /// A call was rejected without being attempted.
    RequestRejected {
        /// Service name.
        service: String,
        /// State of the breaker at rejection time.
        state: CircuitState,
    },

    /// The breaker was reset to a fresh closed state.
    Reset {
        /// Service name.
        service: String,
    },
}

impl BreakerEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChange { .. } => "state_change",
            Self::Failure { .. } => "failure",
            Self::Success { .. } => "success",
            Self::RetryAttempt { .. } => "retry_attempt",
            Self::RequestRejected { .. } => "request_rejected",
            Self::Reset { .. } => "reset",
        }
    }

    /// Returns the name of the service the event belongs to.
    pub fn service(&self) -> &str {
        match self {
            Self::StateChange { service, .. }
            | Self::Failure { service, .. }
            | Self::Success { service, .. }
            | Self::RetryAttempt { service, .. }
            | Self::RequestRejected { service, .. }
            | Self::Reset { service } => service,
        }
    }

    /// Returns `true` for events the registry forwards to its observers.
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::StateChange { .. } | Self::Failure { .. })
    }
}

/// Writes the event as a structured `tracing` record.
pub fn emit_event(event: &BreakerEvent) {
    match event {
        BreakerEvent::StateChange {
            service,
            old_state,
            new_state,
            timestamp,
        } => {
            tracing::info!(
                target: "callguard::events",
                event_type = "state_change",
                service = %service,
                old_state = %old_state,
                new_state = %new_state,
                timestamp = %timestamp.to_rfc3339(),
                "Circuit state changed"
            );
        }
        BreakerEvent::Failure {
            service,
            error,
            consecutive_failures,
        } => {
            tracing::warn!(
                target: "callguard::events",
                event_type = "failure",
                service = %service,
                error = %error,
                consecutive_failures = *consecutive_failures,
                "Protected call failed"
            );
        }
        BreakerEvent::Success {
            service,
            latency_ms,
        } => {
            tracing::debug!(
                target: "callguard::events",
                event_type = "success",
                service = %service,
                latency_ms = *latency_ms,
                "Protected call succeeded"
            );
        }
        BreakerEvent::RetryAttempt { service, attempt } => {
            tracing::debug!(
                target: "callguard::events",
                event_type = "retry_attempt",
                service = %service,
                attempt = *attempt,
                "Retrying protected call"
            );
        }
        BreakerEvent::RequestRejected { service, state } => {
            tracing::warn!(
                target: "callguard::events",
                event_type = "request_rejected",
                service = %service,
                state = %state,
                "Call rejected by circuit breaker"
            );
        }
        BreakerEvent::Reset { service } => {
            tracing::info!(
                target: "callguard::events",
                event_type = "reset",
                service = %service,
                "Circuit breaker reset"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let rejected = BreakerEvent::RequestRejected {
            service: "weather".into(),
            state: CircuitState::Open,
        };
        assert_eq!(rejected.event_type(), "request_rejected");
        assert_eq!(rejected.service(), "weather");
        assert!(!rejected.is_forwarded());

        let failure = BreakerEvent::Failure {
            service: "sms".into(),
            error: "gateway 502".into(),
            consecutive_failures: 2,
        };
        assert!(failure.is_forwarded());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = BreakerEvent::Reset {
            service: "market_price".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "reset");
        assert_eq!(json["service"], "market_price");
    }
}
