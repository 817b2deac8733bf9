//! Circuit breaker implementation for external service resilience.
//!
//! The circuit breaker prevents cascading failures by temporarily stopping
//! traffic to failing dependencies and letting trial calls through after a
//! cool-down to detect recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through.
//! - **Open**: Service is failing; calls are rejected immediately.
//! - **Half-Open**: Probing the service to see if it has recovered.
//!
//! ```text
//! +--------+  consecutive failures or error rate  +------+
//! | Closed | -----------------------------------> | Open |
//! +--------+                                      +------+
//!     ^                                             |  ^
//!     |  success threshold       reset timeout      |  | any failure
//!     |                          (next call)        v  |
//!     +------------------------------------------ +-----------+
//!                                                 | Half-Open |
//!                                                 +-----------+
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use callguard::circuit_breaker::{BreakerConfig, CircuitBreaker};
//! use std::time::Duration;
//!
//! let config = BreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_reset_timeout(Duration::from_secs(30));
//!
//! let breaker = CircuitBreaker::new("market_price", config);
//! let prices = breaker.execute(|| prices_client.latest("maize")).await?;
//! ```

mod breaker;
mod config;
mod retry;
mod state;
mod window;


pub use breaker::{BreakerBuilder, CircuitBreaker, DEFAULT_SNAPSHOT_TTL};
pub use config::{BreakerConfig, BreakerConfigOverrides};
pub use retry::RetryPolicy;
pub use state::BreakerMetrics;
pub use window::{SlidingWindow, WindowSample, MAX_WINDOW_SAMPLES};
