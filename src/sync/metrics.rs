//! # Sync Metrics
//!
//! Counters and timings for sync passes, exposed through the sync status.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Point-in-time copy of the metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    /// Requests dropped because a pass was running or too recent
    pub skipped_syncs: u64,
    pub conflicts: u64,
    /// Entities left alone because a local write was pending
    pub skipped_for_pending: u64,
    pub average_sync_duration: Duration,
    pub last_sync_duration: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct SyncMetrics {
    snapshot: MetricsSnapshot,
    last_sync_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sync_start(&mut self) {
        self.last_sync_start = Some(Instant::now());
        self.snapshot.total_syncs += 1;
    }

    pub fn record_sync_success(&mut self, conflicts: usize, skipped_for_pending: usize) {
        let metrics = &mut self.snapshot;
        metrics.conflicts += conflicts as u64;
        metrics.skipped_for_pending += skipped_for_pending as u64;
        if let Some(start) = self.last_sync_start.take() {
            let duration = start.elapsed();
            metrics.last_sync_duration = Some(duration);
            metrics.successful_syncs += 1;

            // Update rolling average
            let count = u32::try_from(metrics.successful_syncs).unwrap_or(u32::MAX);
            let total = metrics.average_sync_duration * (count - 1) + duration;
            metrics.average_sync_duration = total / count;
        }
    }

    pub fn record_sync_failure(&mut self) {
        self.last_sync_start = None;
        self.snapshot.failed_syncs += 1;
    }

    pub fn record_skipped(&mut self) {
        self.snapshot.skipped_syncs += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot.clone()
    }

    /// Fraction of started passes that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.snapshot.total_syncs == 0 {
            return 0.0;
        }
        self.snapshot.successful_syncs as f64 / self.snapshot.total_syncs as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_tracking() {
        let mut metrics = SyncMetrics::new();

        metrics.record_sync_start();
        metrics.record_sync_success(2, 1);
        metrics.record_sync_start();
        metrics.record_sync_failure();
        metrics.record_skipped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_syncs, 2);
        assert_eq!(snapshot.successful_syncs, 1);
        assert_eq!(snapshot.failed_syncs, 1);
        assert_eq!(snapshot.skipped_syncs, 1);
        assert_eq!(snapshot.conflicts, 2);
        assert_eq!(snapshot.skipped_for_pending, 1);
        assert!(snapshot.last_sync_duration.is_some());
        assert_eq!(metrics.success_rate(), 0.5);
    }
}
