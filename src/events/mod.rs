//! Observable breaker events.
//!
//! Every event is written as a structured `tracing` record under the
//! `callguard::events` target and published on a typed broadcast channel.
//! Subscribers can be dashboards, alerting hooks or tests.

mod bus;
#[allow(clippy::module_inception)]
mod events;

pub use bus::{EventBus, DEFAULT_EVENT_CAPACITY};
pub use events::{emit_event, BreakerEvent};
