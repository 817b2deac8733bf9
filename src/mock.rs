//! Mock external service for testing.
//!
//! This module provides a configurable stand-in for a flaky third-party
//! dependency, so breaker behaviour can be exercised without a network.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Error returned by [`MockService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} failed: {reason}")]
pub struct MockError {
    /// Name of the mock service.
    pub service: String,
    /// Why the call failed.
    pub reason: String,
}

/// A mock dependency with scripted failures and latency.
///
/// # Examples
///
/// ```rust
/// use callguard::mock::MockService;
/// use std::time::Duration;
///
/// // Fails the first two calls, then recovers.
/// let service = MockService::new("weather").fail_first(2);
///
/// // Always fails.
/// let broken = MockService::new("sms").always_fail();
///
/// // Succeeds, slowly.
/// let slow = MockService::new("vision").with_latency(Duration::from_secs(45));
/// ```
#[derive(Debug)]
pub struct MockService {
    /// Name of this mock.
    name: String,
    /// Simulated latency per call.
    latency: Option<Duration>,
    /// Remaining scripted failures.
    fail_remaining: AtomicU32,
    /// Fail every call while set.
    failing: AtomicBool,
    /// Number of calls received.
    call_count: AtomicU64,
}

impl MockService {
    /// Creates a mock that always succeeds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: None,
            fail_remaining: AtomicU32::new(0),
            failing: AtomicBool::new(false),
            call_count: AtomicU64::new(0),
        }
    }

    /// Fails the next `n` calls, then succeeds.
    pub fn fail_first(self, n: u32) -> Self {
        self.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    /// Fails every call.
    pub fn always_fail(self) -> Self {
        self.failing.store(true, Ordering::SeqCst);
        self
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Switches permanent failure on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Schedules `n` more failures.
    pub fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Returns the number of calls received.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Returns the mock's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Performs a call.
    pub async fn call(&self) -> Result<String, MockError> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.should_fail() {
            return Err(MockError {
                service: self.name.clone(),
                reason: format!("simulated failure on call {n}"),
            });
        }
        Ok(format!("{} response #{n}", self.name))
    }

    fn should_fail(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_succeeds() {
        let service = MockService::new("weather");
        assert_eq!(service.call().await.unwrap(), "weather response #1");
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_fail_first() {
        let service = MockService::new("sms").fail_first(2);
        assert!(service.call().await.is_err());
        assert!(service.call().await.is_err());
        assert!(service.call().await.is_ok());
        assert_eq!(service.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_toggle_failing() {
        let service = MockService::new("prices").always_fail();
        let err = service.call().await.unwrap_err();
        assert_eq!(err.service, "prices");

        service.set_failing(false);
        assert!(service.call().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_latency() {
        let service = MockService::new("vision").with_latency(Duration::from_secs(3));
        let started = tokio::time::Instant::now();
        service.call().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }
}
