//! Error types for the callguard library.
//!
//! Errors produced by the breaker distinguish "not even attempted" from
//! "attempted and failed", so callers without a fallback can tell a
//! known-bad service apart from a slow or broken one.

use crate::core::types::CircuitState;

use std::time::Duration;
use thiserror::Error;

/// The error returned by a protected call.
///
/// `E` is the operation's own error type, which is passed through unwrapped
/// in [`BreakerError::Operation`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The call was rejected without invoking the operation.
    #[error("circuit breaker for service '{service}' is {state}; call rejected")]
    CircuitOpen {
        /// Name of the protected service.
        service: String,
        /// State of the breaker at rejection time.
        state: CircuitState,
        /// Remaining cool-down before a trial call is allowed, if known.
        retry_in: Option<Duration>,
    },

    /// The last attempt did not settle within the configured timeout.
    #[error("call to service '{service}' timed out after {elapsed:?}")]
    Timeout {
        /// Name of the protected service.
        service: String,
        /// The per-attempt deadline that was exceeded.
        elapsed: Duration,
    },

    /// The operation's own failure, returned after retries were exhausted.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Creates a `CircuitOpen` error.
    pub fn circuit_open(
        service: impl Into<String>,
        state: CircuitState,
        retry_in: Option<Duration>,
    ) -> Self {
        Self::CircuitOpen {
            service: service.into(),
            state,
            retry_in,
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(service: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            service: service.into(),
            elapsed,
        }
    }

    /// Returns `true` if the call was rejected by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Returns `true` if the call timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the error was generated by the breaker itself
    /// rather than by the operation.
    pub fn is_breaker_generated(&self) -> bool {
        !matches!(self, Self::Operation(_))
    }

    /// Returns the service name for breaker-generated errors.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::CircuitOpen { service, .. } | Self::Timeout { service, .. } => Some(service),
            Self::Operation(_) => None,
        }
    }

    /// Returns a reference to the operation's error, if this is one.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes the error and returns the operation's error, if this is one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Error type for persistence adapters.
///
/// These errors are logged by the breaker and never change the outcome of a
/// protected call.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backing store rejected or failed the operation.
    #[error("persistence backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A stored snapshot could not be encoded or decoded.
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistenceError {
    /// Creates a `Backend` error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_error_kinds() {
        let open: BreakerError<String> =
            BreakerError::circuit_open("weather", CircuitState::Open, None);
        assert!(open.is_circuit_open());
        assert!(open.is_breaker_generated());
        assert_eq!(open.service(), Some("weather"));

        let timeout: BreakerError<String> =
            BreakerError::timeout("weather", Duration::from_secs(5));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_circuit_open());

        let op: BreakerError<String> = BreakerError::Operation("bad gateway".into());
        assert!(!op.is_breaker_generated());
        assert_eq!(op.service(), None);
        assert_eq!(op.operation_error().map(String::as_str), Some("bad gateway"));
        assert_eq!(op.into_operation().as_deref(), Some("bad gateway"));
    }

    #[test]
    fn test_breaker_error_display() {
        let open: BreakerError<String> =
            BreakerError::circuit_open("sms", CircuitState::Open, None);
        assert!(open.to_string().contains("'sms'"));
        assert!(open.to_string().contains("open"));

        let op: BreakerError<String> = BreakerError::Operation("upstream 503".into());
        assert_eq!(op.to_string(), "upstream 503");
    }

    #[test]
    fn test_persistence_error_from_json() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err = PersistenceError::from(err);
        assert!(matches!(err, PersistenceError::Serialization(_)));
    }
}
