// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory operation tracking for HTTP polling.
//!
//! All operation state lives in a process-wide registry keyed by progress id.
//! The owning orchestrator mutates state exclusively through a
//! [`ProgressTracker`]; HTTP handlers read snapshots. Terminal operations
//! stay visible for a grace period so pollers can observe the final state,
//! then get evicted.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;

/// How long a terminal operation stays readable before eviction.
pub const EVICTION_DELAY: Duration = Duration::from_secs(30);

/// Cap on retained log entries per operation.
const MAX_LOG_ENTRIES: usize = 200;

/// Fields that stage extras may never override.
const PROTECTED_FIELDS: &[&str] = &["progress", "status", "log", "progress_id", "type", "start_time"];

static REGISTRY: Lazy<RwLock<HashMap<String, Operation>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Operation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Starting,
    Initializing,
    Analyzing,
    Crawling,
    Processing,
    SourceCreation,
    DocumentStorage,
    CodeExtraction,
    CodeStorage,
    Finalization,
    Reading,
    TextExtraction,
    Chunking,
    Summarizing,
    Storing,
    Completed,
    Failed,
    Error,
    Cancelled,
}

impl OperationStatus {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "starting" => Self::Starting,
            "initializing" => Self::Initializing,
            "analyzing" => Self::Analyzing,
            "crawling" => Self::Crawling,
            "processing" => Self::Processing,
            "source_creation" => Self::SourceCreation,
            "document_storage" => Self::DocumentStorage,
            "code_extraction" => Self::CodeExtraction,
            "code_storage" => Self::CodeStorage,
            "finalization" => Self::Finalization,
            "reading" => Self::Reading,
            "text_extraction" => Self::TextExtraction,
            "chunking" => Self::Chunking,
            "summarizing" => Self::Summarizing,
            "storing" => Self::Storing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "error" => Self::Error,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Initializing => "initializing",
            Self::Analyzing => "analyzing",
            Self::Crawling => "crawling",
            Self::Processing => "processing",
            Self::SourceCreation => "source_creation",
            Self::DocumentStorage => "document_storage",
            Self::CodeExtraction => "code_extraction",
            Self::CodeStorage => "code_storage",
            Self::Finalization => "finalization",
            Self::Reading => "reading",
            Self::TextExtraction => "text_extraction",
            Self::Chunking => "chunking",
            Self::Summarizing => "summarizing",
            Self::Storing => "storing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states stop polling and schedule eviction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Error | Self::Cancelled)
    }
}

/// A retained log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub status: OperationStatus,
    pub progress: u32,
}

/// Snapshot of one tracked operation.
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub progress_id: String,
    #[serde(rename = "type")]
    pub operation_type: String,
    pub status: OperationStatus,
    pub progress: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    pub logs: Vec<LogEntry>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Seconds between start and terminalization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Stage-specific fields (current_url, total_pages, chunks_stored, ...).
    #[serde(flatten)]
    pub extras: serde_json::Map<String, Value>,
}

/// Handle through which an orchestrator mutates its operation.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    progress_id: String,
}

impl ProgressTracker {
    /// Create a tracker and register the operation as `initializing`.
    pub fn new(progress_id: impl Into<String>, operation_type: &str) -> Self {
        let progress_id = progress_id.into();
        let operation = Operation {
            progress_id: progress_id.clone(),
            operation_type: operation_type.to_string(),
            status: OperationStatus::Initializing,
            progress: 0,
            log: None,
            logs: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            error: None,
            duration: None,
            extras: serde_json::Map::new(),
        };
        REGISTRY
            .write()
            .unwrap()
            .insert(progress_id.clone(), operation);
        Self { progress_id }
    }

    /// Handle to an already-registered operation without resetting its state.
    ///
    /// Used by the stop endpoint to mark cancellation on an operation it did
    /// not create. Updates on a non-existent id are no-ops.
    pub fn attach(progress_id: impl Into<String>) -> Self {
        Self {
            progress_id: progress_id.into(),
        }
    }

    pub fn progress_id(&self) -> &str {
        &self.progress_id
    }

    /// Get an operation snapshot by id.
    pub fn get(progress_id: &str) -> Option<Operation> {
        REGISTRY.read().unwrap().get(progress_id).cloned()
    }

    /// Remove an operation from the registry.
    pub fn clear(progress_id: &str) {
        REGISTRY.write().unwrap().remove(progress_id);
    }

    /// Snapshot of all non-terminal operations.
    pub fn list_active() -> Vec<Operation> {
        REGISTRY
            .read()
            .unwrap()
            .values()
            .filter(|op| !op.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Mark the operation started and seed initial fields.
    pub fn start(&self, initial: serde_json::Map<String, Value>) {
        let mut registry = REGISTRY.write().unwrap();
        if let Some(op) = registry.get_mut(&self.progress_id) {
            op.status = OperationStatus::Starting;
            op.start_time = Utc::now();
            merge_extras(op, initial);
        }
        tracing::info!(
            "Progress tracking started | progress_id={} ",
            self.progress_id
        );
    }

    /// Update status, progress and log, merging stage-specific extras.
    ///
    /// Progress is clamped to 0-100 and never decreases; extras may not
    /// override protected fields. Unknown status strings keep the previous
    /// status.
    pub fn update(
        &self,
        status: &str,
        progress: u32,
        log: &str,
        extras: serde_json::Map<String, Value>,
    ) {
        let parsed_status = OperationStatus::parse(status);
        if parsed_status.is_none() {
            tracing::warn!("Unknown operation status '{}', keeping previous", status);
        }

        let mut became_terminal = false;
        {
            let mut registry = REGISTRY.write().unwrap();
            let Some(op) = registry.get_mut(&self.progress_id) else {
                return;
            };

            let new_progress = progress.min(100);
            let actual_progress = if new_progress < op.progress {
                tracing::debug!(
                    "Progress backwards prevented: {}% -> {}% | progress_id={}",
                    op.progress,
                    new_progress,
                    self.progress_id
                );
                op.progress
            } else {
                new_progress
            };

            if let Some(status) = parsed_status {
                op.status = status;
                became_terminal = status.is_terminal();
            }
            op.progress = actual_progress;
            op.log = Some(log.to_string());

            op.logs.push(LogEntry {
                timestamp: Utc::now(),
                message: log.to_string(),
                status: op.status,
                progress: actual_progress,
            });
            if op.logs.len() > MAX_LOG_ENTRIES {
                let excess = op.logs.len() - MAX_LOG_ENTRIES;
                op.logs.drain(..excess);
            }

            merge_extras(op, extras);
        }

        if became_terminal {
            self.schedule_eviction();
        }
    }

    /// Mark the operation completed with optional completion data.
    pub fn complete(&self, mut data: serde_json::Map<String, Value>) {
        {
            let mut registry = REGISTRY.write().unwrap();
            let Some(op) = registry.get_mut(&self.progress_id) else {
                return;
            };
            op.status = OperationStatus::Completed;
            op.progress = 100;
            let end = Utc::now();
            op.end_time = Some(end);
            op.duration = Some((end - op.start_time).num_milliseconds() as f64 / 1000.0);
            if let Some(Value::String(log)) = data.remove("log") {
                op.log = Some(log);
            }
            merge_extras(op, data);
        }
        tracing::info!("Progress completed | progress_id={}", self.progress_id);
        self.schedule_eviction();
    }

    /// Mark the operation failed with an error message.
    pub fn error(&self, message: &str, details: Option<Value>) {
        {
            let mut registry = REGISTRY.write().unwrap();
            let Some(op) = registry.get_mut(&self.progress_id) else {
                return;
            };
            op.status = OperationStatus::Error;
            op.error = Some(message.to_string());
            op.log = Some(message.to_string());
            let end = Utc::now();
            op.end_time = Some(end);
            op.duration = Some((end - op.start_time).num_milliseconds() as f64 / 1000.0);
            if let Some(details) = details {
                op.extras.insert("error_details".to_string(), details);
            }
        }
        tracing::error!(
            "Progress error | progress_id={} | error={}",
            self.progress_id,
            message
        );
        self.schedule_eviction();
    }

    /// Remove the operation after the grace period, if still terminal.
    ///
    /// Re-use of the same id restarts the operation in a non-terminal state,
    /// which makes the pending eviction a no-op.
    fn schedule_eviction(&self) {
        let progress_id = self.progress_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(EVICTION_DELAY).await;
            let mut registry = REGISTRY.write().unwrap();
            if registry
                .get(&progress_id)
                .is_some_and(|op| op.status.is_terminal())
            {
                registry.remove(&progress_id);
                tracing::info!("Progress state cleaned up after delay | progress_id={}", progress_id);
            }
        });
    }
}

fn merge_extras(op: &mut Operation, extras: serde_json::Map<String, Value>) {
    for (key, value) in extras {
        if PROTECTED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        match key.as_str() {
            "error" => {
                if let Value::String(s) = &value {
                    op.error = Some(s.clone());
                }
            }
            _ => {
                op.extras.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extras(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let tracker = ProgressTracker::new("test-monotone", "crawl");
        tracker.update("crawling", 10, "a", Default::default());
        tracker.update("crawling", 5, "b", Default::default());
        let op = ProgressTracker::get("test-monotone").unwrap();
        assert_eq!(op.progress, 10);
        ProgressTracker::clear("test-monotone");
    }

    #[tokio::test]
    async fn test_progress_clamped_to_100() {
        let tracker = ProgressTracker::new("test-clamp", "crawl");
        tracker.update("crawling", 250, "a", Default::default());
        assert_eq!(ProgressTracker::get("test-clamp").unwrap().progress, 100);
        ProgressTracker::clear("test-clamp");
    }

    #[tokio::test]
    async fn test_extras_cannot_override_protected_fields() {
        let tracker = ProgressTracker::new("test-protected", "crawl");
        tracker.update(
            "crawling",
            20,
            "msg",
            extras(&[
                ("progress", json!(99)),
                ("type", json!("hijacked")),
                ("current_url", json!("https://x.com")),
            ]),
        );
        let op = ProgressTracker::get("test-protected").unwrap();
        assert_eq!(op.progress, 20);
        assert_eq!(op.operation_type, "crawl");
        assert_eq!(op.extras["current_url"], "https://x.com");
        assert!(!op.extras.contains_key("progress"));
        ProgressTracker::clear("test-protected");
    }

    #[tokio::test]
    async fn test_logs_capped_at_200() {
        let tracker = ProgressTracker::new("test-logcap", "crawl");
        for i in 0..250 {
            tracker.update("crawling", 1, &format!("line {}", i), Default::default());
        }
        let op = ProgressTracker::get("test-logcap").unwrap();
        assert_eq!(op.logs.len(), 200);
        assert_eq!(op.logs.last().unwrap().message, "line 249");
        assert_eq!(op.logs.first().unwrap().message, "line 50");
        ProgressTracker::clear("test-logcap");
    }

    #[tokio::test]
    async fn test_complete_sets_duration_and_full_progress() {
        let tracker = ProgressTracker::new("test-complete", "crawl");
        tracker.update("crawling", 40, "mid", Default::default());
        tracker.complete(extras(&[("chunks_stored", json!(12))]));
        let op = ProgressTracker::get("test-complete").unwrap();
        assert_eq!(op.status, OperationStatus::Completed);
        assert_eq!(op.progress, 100);
        assert!(op.duration.is_some());
        assert_eq!(op.extras["chunks_stored"], 12);
        ProgressTracker::clear("test-complete");
    }

    #[tokio::test]
    async fn test_error_preserves_progress() {
        let tracker = ProgressTracker::new("test-error", "crawl");
        tracker.update("document_storage", 33, "storing", Default::default());
        tracker.error("boom", None);
        let op = ProgressTracker::get("test-error").unwrap();
        assert_eq!(op.status, OperationStatus::Error);
        assert_eq!(op.progress, 33);
        assert_eq!(op.error.as_deref(), Some("boom"));
        ProgressTracker::clear("test-error");
    }

    #[tokio::test]
    async fn test_list_active_excludes_terminal() {
        let a = ProgressTracker::new("test-active-a", "crawl");
        let b = ProgressTracker::new("test-active-b", "crawl");
        a.update("crawling", 10, "x", Default::default());
        b.complete(Default::default());
        let active: Vec<String> = ProgressTracker::list_active()
            .into_iter()
            .map(|op| op.progress_id)
            .collect();
        assert!(active.contains(&"test-active-a".to_string()));
        assert!(!active.contains(&"test-active-b".to_string()));
        ProgressTracker::clear("test-active-a");
        ProgressTracker::clear("test-active-b");
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            OperationStatus::Starting,
            OperationStatus::DocumentStorage,
            OperationStatus::CodeExtraction,
            OperationStatus::Cancelled,
        ] {
            assert_eq!(OperationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OperationStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(OperationStatus::Error.is_terminal());
        assert!(OperationStatus::Cancelled.is_terminal());
        assert!(!OperationStatus::Crawling.is_terminal());
    }
}
