/*
Copyright 2024, Zep Software, Inc.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Live ingestion worker metrics: visible/invisible/processed/failed counts,
//! success rate, and the timestamp of the last refresh.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::queue::QueueStats;

/// A point-in-time snapshot of worker metrics, combining queue-reported
/// visible/invisible counts with the worker's own processed/failed tallies.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub visible: usize,
    pub invisible: usize,
    pub processed: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub last_refresh: DateTime<Utc>,
}

/// Accumulates processed/failed counts across the worker's lifetime.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_stats: QueueStats) -> MetricsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = processed + failed;
        let success_rate = if total == 0 {
            1.0
        } else {
            processed as f64 / total as f64
        };

        MetricsSnapshot {
            visible: queue_stats.visible,
            invisible: queue_stats.invisible,
            processed,
            failed,
            success_rate,
            last_refresh: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_with_no_activity_is_one() {
        let metrics = WorkerMetrics::new();
        let snapshot = metrics.snapshot(QueueStats::default());
        assert_eq!(snapshot.success_rate, 1.0);
    }

    #[test]
    fn test_success_rate_mixed() {
        let metrics = WorkerMetrics::new();
        metrics.record_success();
        metrics.record_success();
        metrics.record_failure();

        let snapshot = metrics.snapshot(QueueStats::default());
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.failed, 1);
        assert!((snapshot.success_rate - (2.0 / 3.0)).abs() < 1e-9);
    }
}
