//! Worker pool counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for worker pool admission and worker lifecycle.
///
/// Dropped submissions are reported nowhere else; this is where saturation
/// becomes visible.
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    submitted: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    spawned: AtomicU64,
    retired: AtomicU64,
}

impl WorkerPoolMetrics {
    /// Records a submission.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a task handed to a worker or queued.
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a task dropped on saturation or after shutdown.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a task that ran to completion.
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a task that panicked.
    pub fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker start.
    pub fn record_spawned(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a worker retiring after its keep-alive.
    pub fn record_retired(&self) {
        self.retired.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of submissions.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Returns the number of accepted tasks.
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Returns the number of dropped tasks.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the number of completed tasks.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Returns the number of panicked tasks.
    #[must_use]
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Returns the number of workers started.
    #[must_use]
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Returns the number of workers retired.
    #[must_use]
    pub fn retired(&self) -> u64 {
        self.retired.load(Ordering::Relaxed)
    }

    /// Returns the drop rate as a percentage of submissions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn drop_rate(&self) -> f64 {
        let submitted = self.submitted();
        if submitted == 0 {
            0.0
        } else {
            (self.dropped() as f64 / submitted as f64) * 100.0
        }
    }

    /// Converts metrics to a dictionary.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "submitted": self.submitted(),
            "accepted": self.accepted(),
            "dropped": self.dropped(),
            "completed": self.completed(),
            "panicked": self.panicked(),
            "spawned": self.spawned(),
            "retired": self.retired(),
            "drop_rate_percent": (self.drop_rate() * 100.0).round() / 100.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_default() {
        let metrics = WorkerPoolMetrics::default();
        assert_eq!(metrics.submitted(), 0);
        assert_eq!(metrics.dropped(), 0);
        assert_eq!(metrics.drop_rate(), 0.0);
    }

    #[test]
    fn test_metrics_drop_rate() {
        let metrics = WorkerPoolMetrics::default();
        for _ in 0..4 {
            metrics.record_submitted();
        }
        metrics.record_accepted();
        metrics.record_accepted();
        metrics.record_accepted();
        metrics.record_dropped();

        assert_eq!(metrics.accepted(), 3);
        assert!((metrics.drop_rate() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_to_dict() {
        let metrics = WorkerPoolMetrics::default();
        metrics.record_spawned();
        metrics.record_retired();

        let dict = metrics.to_dict();
        assert_eq!(dict["spawned"], 1);
        assert_eq!(dict["retired"], 1);
        assert_eq!(dict["dropped"], 0);
    }
}
