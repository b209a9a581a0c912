// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Metrics collection for performance monitoring.
//!
//! Provides lightweight metrics collection without external dependencies.
//! Operations here are the pipeline stages worth watching: crawl fetches,
//! embedding batches, storage inserts, RAG queries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Global metrics instance.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Central metrics collection.
#[derive(Debug)]
pub struct Metrics {
    /// Latency metrics by operation name.
    operations: RwLock<HashMap<String, OperationMetrics>>,

    /// Monotonic counters by name (pages crawled, chunks stored, ...).
    counters: RwLock<HashMap<String, AtomicU64>>,

    /// Start time for calculating uptime.
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a timed operation.
    pub fn record_operation(&self, name: &str, duration: Duration) {
        let mut ops = self.operations.write().unwrap();
        let metrics = ops
            .entry(name.to_string())
            .or_insert_with(OperationMetrics::new);
        metrics.record(duration);
    }

    /// Increment a named counter.
    pub fn increment(&self, name: &str, by: u64) {
        {
            let counters = self.counters.read().unwrap();
            if let Some(counter) = counters.get(name) {
                counter.fetch_add(by, Ordering::Relaxed);
                return;
            }
        }
        let mut counters = self.counters.write().unwrap();
        counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::Relaxed);
    }

    /// Get metrics for a specific operation.
    pub fn operation_metrics(&self, name: &str) -> Option<OperationMetrics> {
        self.operations.read().unwrap().get(name).cloned()
    }

    /// Get a counter value.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Get uptime since metrics were initialized.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = self.operations.read().unwrap().clone();
        let counters = self
            .counters
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            operations,
            counters,
            uptime: self.uptime(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.operations.write().unwrap().clear();
        self.counters.write().unwrap().clear();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency metrics for one operation name.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    /// Number of operations.
    pub count: u64,

    /// Total duration.
    pub total_duration: Duration,

    /// Minimum duration.
    pub min_duration: Duration,

    /// Maximum duration.
    pub max_duration: Duration,
}

impl OperationMetrics {
    /// Create new operation metrics.
    pub fn new() -> Self {
        Self {
            count: 0,
            total_duration: Duration::ZERO,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
        }
    }

    /// Record an operation.
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total_duration += duration;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }

    /// Calculate average duration.
    pub fn avg_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.count as u32
        }
    }
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub operations: HashMap<String, OperationMetrics>,
    pub counters: HashMap<String, u64>,
    pub uptime: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation() {
        let metrics = Metrics::new();
        metrics.record_operation("crawl.fetch", Duration::from_millis(10));
        metrics.record_operation("crawl.fetch", Duration::from_millis(30));

        let op = metrics.operation_metrics("crawl.fetch").unwrap();
        assert_eq!(op.count, 2);
        assert_eq!(op.avg_duration(), Duration::from_millis(20));
        assert_eq!(op.min_duration, Duration::from_millis(10));
        assert_eq!(op.max_duration, Duration::from_millis(30));
    }

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.increment("chunks.stored", 5);
        metrics.increment("chunks.stored", 3);
        assert_eq!(metrics.counter("chunks.stored"), 8);
        assert_eq!(metrics.counter("missing"), 0);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.increment("x", 1);
        metrics.record_operation("y", Duration::from_millis(1));
        metrics.reset();
        assert_eq!(metrics.counter("x"), 0);
        assert!(metrics.operation_metrics("y").is_none());
    }
}
