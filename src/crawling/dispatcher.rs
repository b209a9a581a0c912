// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Memory-adaptive concurrency for crawl batches.
//!
//! Bounds page-level parallelism by the configured maximum and halves the
//! worker count while system memory sits above the configured threshold.
//! The check is sampled per batch, not per page.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::System;
use tokio::sync::Semaphore;

/// Dynamically adjusts crawl concurrency based on memory pressure.
#[derive(Debug, Clone)]
pub struct MemoryAdaptiveDispatcher {
    memory_threshold_percent: f64,
    max_concurrent: usize,
    check_interval: Duration,
}

impl MemoryAdaptiveDispatcher {
    pub fn new(memory_threshold_percent: f64, max_concurrent: usize, check_interval: Duration) -> Self {
        Self {
            memory_threshold_percent,
            max_concurrent: max_concurrent.max(1),
            check_interval,
        }
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Worker count permitted right now.
    pub fn permitted_workers(&self) -> usize {
        let used = memory_used_percent();
        if used > self.memory_threshold_percent {
            let reduced = (self.max_concurrent / 2).max(1);
            tracing::warn!(
                "High memory usage ({:.1}% > {:.1}%), reducing crawl workers to {}",
                used,
                self.memory_threshold_percent,
                reduced
            );
            reduced
        } else {
            self.max_concurrent
        }
    }

    /// Semaphore sized to the currently permitted worker count.
    pub fn semaphore(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.permitted_workers()))
    }

    /// If memory is over threshold, wait one check interval before launching
    /// more work.
    pub async fn defer_if_pressured(&self) {
        if memory_used_percent() > self.memory_threshold_percent {
            tokio::time::sleep(self.check_interval).await;
        }
    }
}

fn memory_used_percent() -> f64 {
    let mut system = System::new();
    system.refresh_memory();
    let total = system.total_memory();
    if total == 0 {
        return 0.0;
    }
    (system.used_memory() as f64 / total as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_bounded_by_max() {
        let dispatcher = MemoryAdaptiveDispatcher::new(100.0, 8, Duration::from_millis(100));
        // Threshold of 100% can never be exceeded, so full concurrency applies.
        assert_eq!(dispatcher.permitted_workers(), 8);
    }

    #[test]
    fn test_workers_halved_under_pressure() {
        // Threshold of 0% is always exceeded.
        let dispatcher = MemoryAdaptiveDispatcher::new(0.0, 8, Duration::from_millis(100));
        assert_eq!(dispatcher.permitted_workers(), 4);

        let single = MemoryAdaptiveDispatcher::new(0.0, 1, Duration::from_millis(100));
        assert_eq!(single.permitted_workers(), 1);
    }

    #[test]
    fn test_memory_percent_in_range() {
        let used = memory_used_percent();
        assert!((0.0..=100.0).contains(&used));
    }
}
