//! Rolling-window overload verdicts computed from [`super::Snapshotter`] samples.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::snapshotter::Snapshotter;

/// Computes `current_status` (short window) and `historical_status` (long
/// window) from the ratio of overloaded samples in each window, per §4.4.
pub struct SystemStatus {
    snapshotter: Arc<Snapshotter>,
    current_window: Duration,
    historical_window: Duration,
    max_overloaded_ratio: f64,
}

impl SystemStatus {
    pub fn new(snapshotter: Arc<Snapshotter>) -> Self {
        SystemStatus {
            snapshotter,
            current_window: Duration::from_secs(5),
            historical_window: Duration::from_secs(30),
            max_overloaded_ratio: 0.2,
        }
    }

    pub fn with_current_window(mut self, window: Duration) -> Self {
        self.current_window = window;
        self
    }

    pub fn with_historical_window(mut self, window: Duration) -> Self {
        self.historical_window = window;
        self
    }

    pub fn with_max_overloaded_ratio(mut self, ratio: f64) -> Self {
        self.max_overloaded_ratio = ratio;
        self
    }

    async fn is_overloaded(&self, window: Duration) -> bool {
        let since = Instant::now() - window;
        let samples = self.snapshotter.snapshots_since(since).await;
        if samples.is_empty() {
            return false;
        }
        let overloaded_count = samples.iter().filter(|s| s.overloaded).count();
        (overloaded_count as f64 / samples.len() as f64) > self.max_overloaded_ratio
    }

    /// Short-window verdict; the scheduler uses this to throttle new task starts.
    pub async fn current_status_is_ok(&self) -> bool {
        !self.is_overloaded(self.current_window).await
    }

    /// Long-window verdict; the scheduler uses this to decide whether to scale down.
    pub async fn historical_status_is_ok(&self) -> bool {
        !self.is_overloaded(self.historical_window).await
    }
}
