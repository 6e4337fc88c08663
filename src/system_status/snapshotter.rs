//! Periodic sampler of CPU, memory, scheduler-tick lag, and client-error rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

/// One sample, tagged with whether any tracked signal crossed its threshold.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub overloaded: bool,
    pub at: Instant,
}

/// Tunables for [`Snapshotter`], mirroring the donor's style of grouping
/// related knobs into one `*Options` struct with a `Default` impl
/// (`BrowserPoolConfig` does the same).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotterOptions {
    pub interval: Duration,
    pub max_cpu_ratio: f64,
    pub max_memory_bytes: u64,
    pub max_event_loop_lag: Duration,
    pub max_client_error_rate: f64,
    /// How long samples are retained before being pruned; must be at least
    /// as long as `SystemStatus`'s longest window.
    pub retention: Duration,
}

impl Default for SnapshotterOptions {
    fn default() -> Self {
        SnapshotterOptions {
            interval: Duration::from_secs(1),
            max_cpu_ratio: 0.95,
            max_memory_bytes: 2 * 1024 * 1024 * 1024,
            max_event_loop_lag: Duration::from_millis(50),
            max_client_error_rate: 0.3,
            retention: Duration::from_secs(60),
        }
    }
}

/// Samples system pressure at a fixed interval into a rolling window that
/// [`crate::system_status::SystemStatus`] reads to compute overload
/// verdicts. Like the donor's resource monitors, everything observable from
/// outside the sampling task (error counts) is plain atomics so callers on
/// other tasks can record them without a lock.
pub struct Snapshotter {
    options: SnapshotterOptions,
    snapshots: Arc<RwLock<Vec<Snapshot>>>,
    client_requests: Arc<AtomicU64>,
    client_errors: Arc<AtomicU64>,
    cpu_ratio_override: Arc<std::sync::atomic::AtomicU64>, // bit-cast f64, test hook
    memory_bytes: Arc<AtomicU64>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Snapshotter {
    pub fn new(options: SnapshotterOptions) -> Self {
        Snapshotter {
            options,
            snapshots: Arc::new(RwLock::new(Vec::new())),
            client_requests: Arc::new(AtomicU64::new(0)),
            client_errors: Arc::new(AtomicU64::new(0)),
            cpu_ratio_override: Arc::new(std::sync::atomic::AtomicU64::new(0f64.to_bits())),
            memory_bytes: Arc::new(AtomicU64::new(0)),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Record one client HTTP response; `is_error` covers 5xx and transport
    /// failures, feeding the client-error-rate signal.
    pub fn record_client_response(&self, is_error: bool) {
        self.client_requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Test/embedding hook: force the CPU ratio used by the next samples,
    /// bypassing real OS measurement.
    pub fn set_cpu_ratio(&self, ratio: f64) {
        self.cpu_ratio_override.store(ratio.to_bits(), Ordering::Relaxed);
    }

    pub fn set_memory_bytes(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::Relaxed);
    }

    fn current_client_error_rate(&self) -> f64 {
        let total = self.client_requests.swap(0, Ordering::Relaxed);
        let errors = self.client_errors.swap(0, Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            errors as f64 / total as f64
        }
    }

    /// Spawns the periodic sampling task. Returns immediately; call
    /// [`Snapshotter::stop`] to cancel.
    pub fn start(self: &Arc<Self>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.options.interval);
            loop {
                let tick_start = Instant::now();
                ticker.tick().await;
                let lag = tick_start.elapsed().saturating_sub(this.options.interval);

                let cpu_ratio = f64::from_bits(this.cpu_ratio_override.load(Ordering::Relaxed));
                let memory = this.memory_bytes.load(Ordering::Relaxed);
                let error_rate = this.current_client_error_rate();

                let overloaded = cpu_ratio > this.options.max_cpu_ratio
                    || memory > this.options.max_memory_bytes
                    || lag > this.options.max_event_loop_lag
                    || error_rate > this.options.max_client_error_rate;

                let snapshot = Snapshot {
                    overloaded,
                    at: Instant::now(),
                };
                debug!(overloaded, ?lag, cpu_ratio, error_rate, "snapshotter: sample taken");

                let mut snapshots = this.snapshots.write().await;
                snapshots.push(snapshot);
                let cutoff = Instant::now() - this.options.retention;
                snapshots.retain(|s| s.at >= cutoff);
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub async fn snapshots_since(&self, since: Instant) -> Vec<Snapshot> {
        self.snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.at >= since)
            .copied()
            .collect()
    }

    /// Directly push a sample, bypassing the timer — used by tests driving
    /// deterministic scenarios (§8 S5) without waiting on real wall-clock
    /// intervals.
    pub async fn push_sample(&self, overloaded: bool) {
        self.snapshots.write().await.push(Snapshot {
            overloaded,
            at: Instant::now(),
        });
    }
}

impl Drop for Snapshotter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_sample_and_read_back() {
        let snapshotter = Snapshotter::new(SnapshotterOptions::default());
        snapshotter.push_sample(false).await;
        snapshotter.push_sample(true).await;
        let samples = snapshotter.snapshots_since(Instant::now() - Duration::from_secs(5)).await;
        assert_eq!(samples.len(), 2);
        assert!(samples[1].overloaded);
    }

    #[tokio::test]
    async fn test_client_error_rate_resets_after_read() {
        let snapshotter = Snapshotter::new(SnapshotterOptions::default());
        snapshotter.record_client_response(true);
        snapshotter.record_client_response(false);
        let rate = snapshotter.current_client_error_rate();
        assert!((rate - 0.5).abs() < 1e-9);
        assert_eq!(snapshotter.current_client_error_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_snapshots_since_filters_old_samples() {
        let snapshotter = Snapshotter::new(SnapshotterOptions::default());
        snapshotter.push_sample(false).await;
        let cutoff = Instant::now() + Duration::from_millis(10);
        tokio::time::sleep(Duration::from_millis(20)).await;
        snapshotter.push_sample(true).await;
        let recent = snapshotter.snapshots_since(cutoff).await;
        assert_eq!(recent.len(), 1);
        assert!(recent[0].overloaded);
    }
}
