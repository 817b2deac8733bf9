//! Common types shared across the library.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    #[default]
    Closed,
    /// The service is known-bad; calls are rejected without being attempted.
    Open,
    /// Probation after the cool-down; trial calls are let through.
    HalfOpen,
}

impl CircuitState {
    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen)
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The class of an external dependency.
///
/// Each kind has its own default breaker tuning; see
/// [`BreakerConfig::for_kind`](crate::circuit_breaker::BreakerConfig::for_kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// High-latency AI vision / image quality analysis.
    ImageAnalysis,
    /// Weather forecast provider.
    Weather,
    /// Market price feed.
    MarketPrice,
    /// SMS / messaging gateway.
    Messaging,
    /// Anything not recognized.
    Generic,
}

impl ServiceKind {
    /// Resolves a service key (usually the breaker name) to a kind.
    ///
    /// Unknown keys map to [`ServiceKind::Generic`].
    pub fn from_key(key: &str) -> Self {
        let key = key.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "image_analysis" | "vision" | "ai_vision" | "quality_analysis" => Self::ImageAnalysis,
            "weather" | "weather_api" | "forecast" => Self::Weather,
            "market_price" | "market_prices" | "pricing" | "prices" => Self::MarketPrice,
            "messaging" | "sms" | "sms_gateway" | "notifications" => Self::Messaging,
            _ => Self::Generic,
        }
    }

    /// Returns the canonical key for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageAnalysis => "image_analysis",
            Self::Weather => "weather",
            Self::MarketPrice => "market_price",
            Self::Messaging => "messaging",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(CircuitState::Closed.name(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half_open");
        assert!(CircuitState::default().is_closed());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&CircuitState::HalfOpen).unwrap();
        assert_eq!(json, "\"half_open\"");
        let state: CircuitState = serde_json::from_str("\"open\"").unwrap();
        assert!(state.is_open());
    }

    #[test]
    fn test_service_kind_lookup() {
        assert_eq!(ServiceKind::from_key("image-analysis"), ServiceKind::ImageAnalysis);
        assert_eq!(ServiceKind::from_key("SMS"), ServiceKind::Messaging);
        assert_eq!(ServiceKind::from_key("weather"), ServiceKind::Weather);
        assert_eq!(ServiceKind::from_key("market_price"), ServiceKind::MarketPrice);
        assert_eq!(ServiceKind::from_key("payments"), ServiceKind::Generic);
    }
}
