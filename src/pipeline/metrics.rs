//! Per-run progress and failure tracking.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Counters shared by all in-flight executions of one run.
#[derive(Debug, Default)]
pub struct RunMetrics {
    /// Total pipelines in the run
    total: u64,

    /// Pipelines that exited successfully
    pub succeeded: AtomicU64,

    /// Pipelines that failed to start or exited non-zero
    pub failed: AtomicU64,

    /// Set once any pipeline fails, never cleared
    any_failure: AtomicBool,

    /// Start time
    start_time: Option<Instant>,
}

impl RunMetrics {
    /// Create metrics for a run of `total` pipelines.
    pub fn new(total: usize) -> Arc<Self> {
        Arc::new(Self {
            total: total as u64,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            any_failure: AtomicBool::new(false),
            start_time: Some(Instant::now()),
        })
    }

    /// Record a success, returning the number of completed pipelines.
    pub fn record_success(&self) -> u64 {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.completed()
    }

    /// Record a failure, returning the number of completed pipelines.
    pub fn record_failure(&self) -> u64 {
        self.any_failure.store(true, Ordering::Release);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.completed()
    }

    /// Pipelines finished so far, successfully or not.
    pub fn completed(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether any pipeline has failed.
    pub fn any_failure(&self) -> bool {
        self.any_failure.load(Ordering::Acquire)
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get completed pipelines per second.
    pub fn pipelines_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.completed() as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total: self.total,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            any_failure: self.any_failure(),
            elapsed: self.elapsed(),
            pipelines_per_second: self.pipelines_per_second(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub any_failure: bool,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub pipelines_per_second: f64,
}

impl MetricsSnapshot {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipelines: {}/{} complete, {} succeeded, {} failed | Rate: {:.2}/s | Elapsed: {:.1}s",
            self.completed(),
            self.total,
            self.succeeded,
            self.failed,
            self.pipelines_per_second,
            self.elapsed.as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let metrics = RunMetrics::new(3);

        assert_eq!(metrics.record_success(), 1);
        assert_eq!(metrics.record_failure(), 2);
        assert_eq!(metrics.record_success(), 3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.failed, 1);
        assert!(snapshot.any_failure);
    }

    #[test]
    fn test_failure_flag_sticks() {
        let metrics = RunMetrics::new(4);
        assert!(!metrics.any_failure());

        metrics.record_failure();
        metrics.record_success();
        metrics.record_failure();

        assert!(metrics.any_failure());
    }

    #[test]
    fn test_concurrent_failures() {
        let metrics = RunMetrics::new(64);
        std::thread::scope(|s| {
            for i in 0..64 {
                let metrics = &metrics;
                s.spawn(move || {
                    if i % 2 == 0 {
                        metrics.record_failure();
                    } else {
                        metrics.record_success();
                    }
                });
            }
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.completed(), 64);
        assert_eq!(snapshot.failed, 32);
        assert!(snapshot.any_failure);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = MetricsSnapshot {
            total: 36,
            succeeded: 30,
            failed: 2,
            any_failure: true,
            elapsed: Duration::from_secs(12),
            pipelines_per_second: 2.67,
        };

        let display = format!("{}", snapshot);
        assert!(display.contains("32/36 complete"));
        assert!(display.contains("30 succeeded"));
        assert!(display.contains("2 failed"));
    }

    #[test]
    fn test_zero_elapsed_no_panic() {
        let metrics = RunMetrics {
            start_time: None,
            ..Default::default()
        };
        metrics.record_success();
        assert_eq!(metrics.pipelines_per_second(), 0.0);
    }
}
