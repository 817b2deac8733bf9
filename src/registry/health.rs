//! Aggregated health across a registry's breakers.

use crate::core::CircuitState;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health of every breaker owned by a registry.
///
/// A service is healthy while its circuit is closed. Half-open counts as
/// unhealthy until enough trial calls have succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    /// `true` if every service is healthy, including when there are none.
    pub healthy: bool,
    /// Health per service name.
    pub per_service: BTreeMap<String, bool>,
    /// Circuit state per service name.
    pub states: BTreeMap<String, CircuitState>,
    /// Number of unhealthy services.
    pub unhealthy_count: usize,
    /// Number of services.
    pub total: usize,
    /// When the report was taken.
    pub checked_at: DateTime<Utc>,
}

impl SystemHealth {
    /// Builds a report from `(service, state)` pairs.
    pub fn from_states<I, S>(states: I) -> Self
    where
        I: IntoIterator<Item = (S, CircuitState)>,
        S: Into<String>,
    {
        let states: BTreeMap<String, CircuitState> =
            states.into_iter().map(|(name, state)| (name.into(), state)).collect();
        let per_service: BTreeMap<String, bool> = states
            .iter()
            .map(|(name, state)| (name.clone(), state.is_closed()))
            .collect();
        let unhealthy_count = per_service.values().filter(|healthy| !**healthy).count();

        Self {
            healthy: unhealthy_count == 0,
            total: per_service.len(),
            per_service,
            states,
            unhealthy_count,
            checked_at: Utc::now(),
        }
    }

    /// Names of the unhealthy services, sorted.
    pub fn unhealthy_services(&self) -> Vec<&str> {
        self.per_service
            .iter()
            .filter(|(_, healthy)| !**healthy)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
