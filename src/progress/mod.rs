// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress and cancellation substrate.
//!
//! Long-running operations (crawls, uploads) are tracked in a process-wide
//! registry and polled over HTTP. Each operation owns a [`ProgressTracker`];
//! stage code reports stage-local progress through a [`ProgressReporter`]
//! which the orchestrator maps onto the overall 0-100 range with a
//! [`ProgressMapper`]. Cancellation is cooperative: a [`CancellationToken`]
//! is threaded through every strategy and storage loop and checked at batch
//! boundaries.

pub mod mapper;
pub mod tracker;

pub use mapper::{ProgressMapper, ProgressStage};
pub use tracker::{Operation, OperationStatus, ProgressTracker, EVICTION_DELAY};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OperationCancelled;

/// A stage-local progress update emitted by pipeline code.
///
/// `progress` is a percentage within the current stage; the receiving
/// reporter is responsible for mapping it into overall progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    /// Stage-local status string (usually the stage name, or `cancelled`).
    pub status: String,
    /// Percent complete within the stage, 0-100.
    pub progress: f64,
    /// Human-readable log line.
    pub message: String,
    /// Stage-specific fields merged into the operation state
    /// (`total_pages`, `processed_pages`, `completed_summaries`, ...).
    pub extras: serde_json::Map<String, Value>,
}

impl ProgressUpdate {
    pub fn new(status: impl Into<String>, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress,
            message: message.into(),
            extras: serde_json::Map::new(),
        }
    }

    /// Attach a stage-specific field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extras.insert(key.to_string(), value.into());
        self
    }
}

/// Sink for stage-local progress updates.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, update: ProgressUpdate);
}

/// No-op reporter for callers that don't track progress.
pub struct NullReporter;

#[async_trait]
impl ProgressReporter for NullReporter {
    async fn report(&self, _update: ProgressUpdate) {}
}

/// Cooperative cancellation token.
///
/// Cloned into every nested task of an operation; `check()?` at batch
/// boundaries and at least every ten inner iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Error with [`OperationCancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), OperationCancelled> {
        if self.is_cancelled() {
            Err(OperationCancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check().unwrap_err(), OperationCancelled);
    }

    #[test]
    fn test_progress_update_builder() {
        let update = ProgressUpdate::new("crawling", 42.0, "Crawled 42/100 pages")
            .with("total_pages", 100)
            .with("processed_pages", 42);
        assert_eq!(update.status, "crawling");
        assert_eq!(update.extras["total_pages"], 100);
    }
}
