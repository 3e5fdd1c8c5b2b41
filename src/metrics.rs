// Profile persistence metrics
//
// Lightweight counters describing how the profile has been loaded and saved

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters recorded by [`ProfileManager`](crate::profile::ProfileManager).
///
/// Uses atomic operations so clones of the manager share one set of counters
/// without locking.
#[derive(Debug)]
pub struct ProfileMetrics {
    /// Number of `load()` calls
    pub loads: AtomicU64,

    /// Loads that fell back to the default document
    pub recoveries: AtomicU64,

    /// Successful writes through the store
    pub persists: AtomicU64,

    /// Writes the store rejected
    pub persist_failures: AtomicU64,

    /// Total time spent in successful store writes, microseconds
    pub total_write_time_us: AtomicU64,

    start_time: Instant,
}

impl ProfileMetrics {
    pub fn new() -> Self {
        Self {
            loads: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
            persists: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            total_write_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful write and how long it took
    pub fn record_persist(&self, duration: Duration) {
        self.persists.fetch_add(1, Ordering::Relaxed);
        self.total_write_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average successful write time in milliseconds
    pub fn avg_write_time_ms(&self) -> f64 {
        let total = self.total_write_time_us.load(Ordering::Relaxed);
        let count = self.persists.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64 / 1000.0
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Profile Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Loads: {} ({} recovered with defaults)",
            self.loads.load(Ordering::Relaxed),
            self.recoveries.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Writes: {} ok, {} failed (avg: {:.3}ms)",
            self.persists.load(Ordering::Relaxed),
            self.persist_failures.load(Ordering::Relaxed),
            self.avg_write_time_ms()
        );
    }
}

impl Default for ProfileMetrics {
    fn default() -> Self {
        Self::new()
    }
}
