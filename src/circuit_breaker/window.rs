//! Sliding window of recent call outcomes.

use std::collections::VecDeque;
use tokio::time::{Duration, Instant};

/// Hard cap on retained samples, independent of traffic.
pub const MAX_WINDOW_SAMPLES: usize = 1000;

/// One recorded call outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    /// When the outcome was recorded.
    pub at: Instant,
    /// Whether the call succeeded.
    pub success: bool,
    /// How long the call took.
    pub latency: Duration,
}

/// A bounded, time-evicting log of recent call outcomes.
#[derive(Debug)]
pub struct SlidingWindow {
    samples: VecDeque<WindowSample>,
    period: Duration,
    cap: usize,
}

impl SlidingWindow {
    /// Creates a window over `period` with the default cap.
    pub fn new(period: Duration) -> Self {
        Self::with_capacity(period, MAX_WINDOW_SAMPLES)
    }

    /// Creates a window over `period` holding at most `cap` samples.
    pub fn with_capacity(period: Duration, cap: usize) -> Self {
        let cap = cap.max(2);
        SlidingWindow {
            samples: VecDeque::with_capacity(cap.min(64)),
            period,
            cap,
        }
    }

    /// Appends an outcome, evicting expired samples and enforcing the cap.
    pub fn record(&mut self, success: bool, latency: Duration) {
        let now = Instant::now();
        self.samples.push_back(WindowSample {
            at: now,
            success,
            latency,
        });
        self.evict(now);

        // over the cap: throw away the oldest half in one go.
        if self.samples.len() > self.cap {
            let excess = self.samples.len() / 2;
            self.samples.drain(..excess);
        }
    }

    /// Drops samples older than the monitoring period.
    pub fn prune(&mut self) {
        self.evict(Instant::now());
    }

    /// Returns `(total, failed)` for samples inside the monitoring period.
    pub fn counts(&self) -> (usize, usize) {
        let now = Instant::now();
        self.samples
            .iter()
            .filter(|s| now.duration_since(s.at) <= self.period)
            .fold((0, 0), |(total, failed), s| {
                (total + 1, failed + usize::from(!s.success))
            })
    }

    /// Error rate in percent over the monitoring period, `None` when empty.
    pub fn error_percentage(&self) -> Option<f64> {
        let (total, failed) = self.counts();
        if total == 0 {
            return None;
        }
        Some(failed as f64 / total as f64 * 100.0)
    }

    /// Returns `true` once enough samples exist and the error rate reaches
    /// `threshold` percent.
    pub fn exceeds(&self, volume_threshold: u32, threshold: f64) -> bool {
        let (total, failed) = self.counts();
        if total == 0 || total < volume_threshold as usize {
            return false;
        }
        let rate = failed as f64 / total as f64 * 100.0;
        let exceeded = rate >= threshold;
        if exceeded {
            tracing::trace!(
                error_rate = rate,
                threshold,
                samples = total,
                "Window error rate at or above threshold"
            );
        }
        exceeded
    }

    /// Number of retained samples, expired ones not yet evicted included.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The hard cap.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Drops every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > self.period {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_error_percentage() {
        let mut window = SlidingWindow::new(Duration::from_secs(60));
        assert_eq!(window.error_percentage(), None);

        window.record(true, Duration::from_millis(5));
        window.record(false, Duration::from_millis(5));
        window.record(false, Duration::from_millis(5));
        window.record(true, Duration::from_millis(5));

        assert_eq!(window.counts(), (4, 2));
        assert_eq!(window.error_percentage(), Some(50.0));
        assert!(window.exceeds(4, 50.0));
        assert!(!window.exceeds(5, 50.0));
        assert!(!window.exceeds(4, 60.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_samples_never_count() {
        let mut window = SlidingWindow::new(Duration::from_secs(10));
        for _ in 0..5 {
            window.record(false, Duration::ZERO);
        }
        assert!(window.exceeds(5, 50.0));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(window.counts(), (0, 0));
        assert!(!window.exceeds(1, 1.0));

        window.record(true, Duration::ZERO);
        assert_eq!(window.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune() {
        let mut window = SlidingWindow::new(Duration::from_secs(1));
        window.record(true, Duration::ZERO);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(window.len(), 1);
        window.prune();
        assert!(window.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_never_exceeds_cap() {
        let mut window = SlidingWindow::with_capacity(Duration::from_secs(3600), 100);
        for i in 0..1_000 {
            window.record(i % 3 != 0, Duration::from_millis(1));
            assert!(window.len() <= window.capacity());
        }
        assert!(window.len() >= 50);
    }
}
